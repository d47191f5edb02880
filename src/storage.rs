//! Local persistence for the replica.
//!
//! Everything lives in a single `SQLite` file:
//!
//! ```text
//! ~/.almanac/replica.sqlite
//!   steps           # itinerary steps, unique by position
//!   links           # step links, cascade-deleted with their step
//!   news            # news items, unique by (title, date)
//!   syncs           # audit log of sync attempts
//!   registrations   # registration tokens the remote accepted
//! ```
//!
//! Each collection is served by a [`Repository`] that owns its own connection
//! behind a mutex. Writes to one collection are serialized; writes to
//! different collections may proceed in parallel and are not atomic with
//! respect to each other.
//!
//! Row mapping goes through a single boundary, the [`Record`] trait. The
//! generic repository handles every collection the same way; collection
//! specific queries live in the submodules.

mod news;
mod registrations;
mod steps;
mod syncs;

use std::{
    fs, io,
    marker::PhantomData,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension, Row, params_from_iter, types::Value};
use tokio::sync::broadcast;
use tokio_stream::{Stream, wrappers::BroadcastStream};

use crate::model::{NewsRecord, RegistrationRecord, StepRecord, SyncRecord};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{table} record not found: {id}")]
    NotFound { table: &'static str, id: String },

    #[error("{0} record has no identifier")]
    MissingId(&'static str),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("{0} connection lock poisoned")]
    Poisoned(&'static str),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

pub type StepsRepository = Repository<StepRecord>;
pub type NewsRepository = Repository<NewsRecord>;
pub type SyncsRepository = Repository<SyncRecord>;
pub type RegistrationsRepository = Repository<RegistrationRecord>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS steps (
        id            TEXT PRIMARY KEY NOT NULL,
        position      INTEGER NOT NULL UNIQUE,
        title         TEXT NOT NULL,
        description   TEXT NOT NULL,
        completed     INTEGER NOT NULL,
        possible_date TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS links (
        id      TEXT PRIMARY KEY NOT NULL,
        step_id TEXT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
        title   TEXT NOT NULL,
        url     TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS links_step_id ON links(step_id);
    CREATE TABLE IF NOT EXISTS news (
        id    TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        url   TEXT NOT NULL,
        date  INTEGER NOT NULL,
        tldr  TEXT,
        UNIQUE (title, date)
    );
    CREATE TABLE IF NOT EXISTS syncs (
        id           TEXT PRIMARY KEY NOT NULL,
        pending      INTEGER NOT NULL,
        time_created INTEGER NOT NULL,
        time_synced  INTEGER
    );
    CREATE TABLE IF NOT EXISTS registrations (
        token        TEXT PRIMARY KEY NOT NULL,
        time_created INTEGER NOT NULL
    );
";

/// How long a connection waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered change signals per subscriber before it starts lagging.
const CHANGE_CAPACITY: usize = 64;

/// The row ↔ struct boundary for one collection.
///
/// `from_row` receives the key column first, then [`Record::COLUMNS`] in
/// order; `bind` produces values for [`Record::COLUMNS`] only.
pub trait Record: Sized + Send + 'static {
    /// Table backing the collection.
    const TABLE: &'static str;

    /// Primary key column.
    const KEY: &'static str = "id";

    /// Value columns, excluding the key.
    const COLUMNS: &'static [&'static str];

    /// Ordering applied by [`Repository::get_all`], if any.
    const ORDER_BY: Option<&'static str> = None;

    /// The record's key, if it has been assigned one.
    fn id(&self) -> Option<&str>;

    /// Fills in the identifier and any timestamps before first insertion.
    #[must_use]
    fn prepare(self) -> Self;

    fn bind(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A change signal. Carries no payload; subscribers re-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change;

/// Subscription to one collection's change signals.
///
/// Dropping the stream cancels the subscription. A subscriber that falls
/// behind still receives a signal, never an error.
pub struct ChangeStream {
    inner: BroadcastStream<Change>,
}

impl Stream for ChangeStream {
    type Item = Change;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Change>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|next| next.map(|_| Change))
    }
}

/// CRUD, queries, and change notification over one collection.
pub struct Repository<R> {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Change>,
    record: PhantomData<fn() -> R>,
}

impl<R: Record> Repository<R> {
    /// Opens a connection to an already-initialized replica database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = connect(path)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            record: PhantomData,
        })
    }

    /// Returns every record, in the collection's natural order.
    pub fn get_all(&self) -> Result<Vec<R>> {
        let conn = self.lock()?;
        query_rows(&conn, None, [])
    }

    /// Returns the record with the given key.
    pub fn get(&self, id: &str) -> Result<Option<R>> {
        let conn = self.lock()?;
        query_one(&conn, &format!("{} = ?1", R::KEY), [id])
    }

    /// Inserts a record, assigning its identifier and timestamps if absent.
    ///
    /// Returns the record as persisted.
    pub fn add(&self, record: R) -> Result<R> {
        let record = record.prepare();
        {
            let conn = self.lock()?;
            insert_row(&conn, &record)?;
        }
        self.notify();
        Ok(record)
    }

    /// Overwrites the stored record that has the same identifier.
    pub fn update(&self, record: &R) -> Result<()> {
        {
            let conn = self.lock()?;
            update_row(&conn, record)?;
        }
        self.notify();
        Ok(())
    }

    /// Deletes by key. Deleting an absent key affects zero rows.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let rows = {
            let conn = self.lock()?;
            conn.execute(
                &format!("DELETE FROM {} WHERE {} = ?1", R::TABLE, R::KEY),
                [id],
            )?
        };
        if rows > 0 {
            self.notify();
        }
        Ok(rows)
    }

    /// Deletes every record in the collection.
    pub fn delete_all(&self) -> Result<usize> {
        let rows = {
            let conn = self.lock()?;
            conn.execute(&format!("DELETE FROM {}", R::TABLE), [])?
        };
        if rows > 0 {
            self.notify();
        }
        Ok(rows)
    }

    /// Subscribes to change signals for this collection.
    pub fn observe_changes(&self) -> ChangeStream {
        ChangeStream {
            inner: BroadcastStream::new(self.changes.subscribe()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned(R::TABLE))
    }

    fn notify(&self) {
        // No receivers is not an error: nobody is watching.
        self.changes.send(Change).ok();
    }
}

/// Handles to every collection of one replica database.
#[derive(Clone)]
pub struct Replica {
    pub steps: Arc<StepsRepository>,
    pub news: Arc<NewsRepository>,
    pub syncs: Arc<SyncsRepository>,
    pub registrations: Arc<RegistrationsRepository>,
}

impl Replica {
    /// Opens (creating if needed) the replica database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = connect(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);

        Ok(Self {
            steps: Arc::new(Repository::open(&path)?),
            news: Arc::new(Repository::open(&path)?),
            syncs: Arc::new(Repository::open(&path)?),
            registrations: Arc::new(Repository::open(&path)?),
        })
    }

    /// Returns the default database path: `~/.almanac/replica.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".almanac").join("replica.sqlite"))
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

// ── Generic row helpers, usable inside transactions ──

fn select_sql<R: Record>(filter: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT {}, {} FROM {}",
        R::KEY,
        R::COLUMNS.join(", "),
        R::TABLE
    );
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    if let Some(order) = R::ORDER_BY {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    sql
}

fn query_rows<R: Record>(
    conn: &Connection,
    filter: Option<&str>,
    params: impl rusqlite::Params,
) -> Result<Vec<R>> {
    let mut stmt = conn.prepare(&select_sql::<R>(filter))?;
    let rows = stmt.query_map(params, |row| R::from_row(row))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_one<R: Record>(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<R>> {
    let sql = format!("{} LIMIT 1", select_sql::<R>(Some(filter)));
    Ok(conn
        .query_row(&sql, params, |row| R::from_row(row))
        .optional()?)
}

fn insert_row<R: Record>(conn: &Connection, record: &R) -> Result<()> {
    let id = record.id().ok_or(StorageError::MissingId(R::TABLE))?;
    let placeholders = (1..=R::COLUMNS.len() + 1)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({placeholders})",
        R::TABLE,
        R::KEY,
        R::COLUMNS.join(", ")
    );
    let mut values = vec![Value::from(id.to_string())];
    values.extend(record.bind());
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn update_row<R: Record>(conn: &Connection, record: &R) -> Result<()> {
    let id = record.id().ok_or(StorageError::MissingId(R::TABLE))?;
    let assignments = R::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE {} = ?{}",
        R::TABLE,
        R::KEY,
        R::COLUMNS.len() + 1
    );
    let mut values = record.bind();
    values.push(Value::from(id.to_string()));
    let rows = conn.execute(&sql, params_from_iter(values))?;
    if rows == 0 {
        return Err(StorageError::NotFound {
            table: R::TABLE,
            id: id.to_string(),
        });
    }
    Ok(())
}
