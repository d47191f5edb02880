//! Reconciliation: make a local collection match a freshly fetched remote one.
//!
//! Records are matched by a merge key rather than by identifier, because the
//! remote never sees local identifiers. A matched record whose content
//! differs is updated in place and keeps its identifier, so anything holding
//! that identifier (a selection, a highlighted row) survives a refresh.
//!
//! Work is split in two: [`plan`] computes the inserts, updates and deletes
//! without touching storage, and [`apply`] executes a plan against a
//! [`MergeTarget`] in insert → update → delete order. A failed mutation does
//! not stop the others; failures are collected and nothing that succeeded is
//! rolled back. Running the same payload again converges.

mod news;
mod steps;

use std::collections::{HashMap, HashSet, hash_map::Entry};
use std::fmt;
use std::hash::Hash;

use tracing::{debug, warn};

use crate::storage::StorageError;

/// A local record that can be matched against its remote counterpart.
pub trait Mergeable {
    /// Collection name, for logs and errors.
    const COLLECTION: &'static str;

    type Key: Eq + Hash + Clone + fmt::Debug;
    type Remote;

    fn key(&self) -> Self::Key;

    fn remote_key(remote: &Self::Remote) -> Self::Key;

    /// Compares everything except the identifier.
    fn content_equals(&self, remote: &Self::Remote) -> bool;

    fn local_id(&self) -> Option<&str>;
}

/// Where a plan is applied. Implemented by the repositories.
pub trait MergeTarget<T: Mergeable> {
    /// Current local content.
    fn load_local(&self) -> Result<Vec<T>, StorageError>;

    fn insert_remote(&self, remote: &T::Remote) -> Result<(), StorageError>;

    fn update_remote(&self, id: &str, remote: &T::Remote) -> Result<(), StorageError>;

    fn delete_local(&self, id: &str) -> Result<(), StorageError>;
}

/// The mutations that turn a local collection into the remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<K, R> {
    pub inserts: Vec<R>,
    pub updates: Vec<Update<R>>,
    pub deletes: Vec<Delete<K>>,
}

/// Overwrite the record `id` with `remote`'s content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update<R> {
    pub id: String,
    pub remote: R,
}

/// Remove the record `id`, which had merge key `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete<K> {
    pub id: String,
    pub key: K,
}

impl<K, R> Plan<K, R> {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// Counts of mutations that were applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl Applied {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted",
            self.inserted, self.updated, self.deleted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One mutation that could not be applied.
#[derive(Debug, thiserror::Error)]
#[error("{kind} of {key} failed: {source}")]
pub struct MutationFailure {
    pub kind: MutationKind,
    pub key: String,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Two local records share a merge key. Nothing was applied.
    #[error("{collection}: local records share merge key {key}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },

    /// A stored record came back without an identifier. Nothing was applied.
    #[error("{collection}: local record {key} has no identifier")]
    MissingId {
        collection: &'static str,
        key: String,
    },

    #[error("{collection}: could not read local records: {source}")]
    Load {
        collection: &'static str,
        #[source]
        source: StorageError,
    },

    /// Some mutations failed. The rest, counted in `applied`, stay applied.
    #[error("{collection}: {} mutation(s) failed ({applied})", failures.len())]
    Apply {
        collection: &'static str,
        applied: Applied,
        failures: Vec<MutationFailure>,
    },
}

impl ReconcileError {
    /// True when the local collection itself is inconsistent, as opposed to a
    /// failure while reading or writing it.
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. } | Self::MissingId { .. })
    }
}

/// Computes the mutations that make `local` match `remote`.
///
/// A remote key that appears more than once keeps its first record; later
/// ones are dropped with a warning.
pub fn plan<T: Mergeable>(
    remote: Vec<T::Remote>,
    local: &[T],
) -> Result<Plan<T::Key, T::Remote>, ReconcileError> {
    let mut by_key: HashMap<T::Key, &T> = HashMap::with_capacity(local.len());
    for record in local {
        match by_key.entry(record.key()) {
            Entry::Occupied(entry) => {
                return Err(ReconcileError::DuplicateKey {
                    collection: T::COLLECTION,
                    key: format!("{:?}", entry.key()),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
    }

    let mut plan = Plan {
        inserts: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };
    let mut visited = HashSet::with_capacity(remote.len());

    for remote in remote {
        let key = T::remote_key(&remote);
        if !visited.insert(key.clone()) {
            warn!(collection = T::COLLECTION, ?key, "duplicate key in remote payload, ignoring");
            continue;
        }
        match by_key.get(&key) {
            None => plan.inserts.push(remote),
            Some(local) if local.content_equals(&remote) => {}
            Some(local) => plan.updates.push(Update {
                id: identifier(*local)?,
                remote,
            }),
        }
    }

    for record in local {
        let key = record.key();
        if !visited.contains(&key) {
            plan.deletes.push(Delete {
                id: identifier(record)?,
                key,
            });
        }
    }

    Ok(plan)
}

/// Applies `plan` to `target`: inserts, then updates, then deletes.
pub fn apply<T, S>(target: &S, plan: Plan<T::Key, T::Remote>) -> Result<Applied, ReconcileError>
where
    T: Mergeable,
    S: MergeTarget<T> + ?Sized,
{
    let mut applied = Applied::default();
    let mut failures = Vec::new();

    for remote in &plan.inserts {
        let key = T::remote_key(remote);
        match target.insert_remote(remote) {
            Ok(()) => {
                debug!(collection = T::COLLECTION, ?key, "inserted");
                applied.inserted += 1;
            }
            Err(source) => failures.push(failure(MutationKind::Insert, &key, source)),
        }
    }

    for update in &plan.updates {
        let key = T::remote_key(&update.remote);
        match target.update_remote(&update.id, &update.remote) {
            Ok(()) => {
                debug!(collection = T::COLLECTION, ?key, id = %update.id, "updated");
                applied.updated += 1;
            }
            Err(source) => failures.push(failure(MutationKind::Update, &key, source)),
        }
    }

    for delete in &plan.deletes {
        match target.delete_local(&delete.id) {
            Ok(()) => {
                debug!(collection = T::COLLECTION, key = ?delete.key, id = %delete.id, "deleted");
                applied.deleted += 1;
            }
            Err(source) => failures.push(failure(MutationKind::Delete, &delete.key, source)),
        }
    }

    if failures.is_empty() {
        Ok(applied)
    } else {
        for f in &failures {
            warn!(collection = T::COLLECTION, "{f}");
        }
        Err(ReconcileError::Apply {
            collection: T::COLLECTION,
            applied,
            failures,
        })
    }
}

/// Loads the local collection, plans against `remote`, and applies the plan.
pub fn reconcile<T, S>(target: &S, remote: Vec<T::Remote>) -> Result<Applied, ReconcileError>
where
    T: Mergeable,
    S: MergeTarget<T> + ?Sized,
{
    let local = target.load_local().map_err(|source| ReconcileError::Load {
        collection: T::COLLECTION,
        source,
    })?;
    let plan = plan(remote, &local)?;
    if plan.is_empty() {
        debug!(collection = T::COLLECTION, "already up to date");
        return Ok(Applied::default());
    }
    debug!(collection = T::COLLECTION, mutations = plan.len(), "applying plan");
    apply(target, plan)
}

fn identifier<T: Mergeable>(record: &T) -> Result<String, ReconcileError> {
    record
        .local_id()
        .map(str::to_string)
        .ok_or_else(|| ReconcileError::MissingId {
            collection: T::COLLECTION,
            key: format!("{:?}", record.key()),
        })
}

fn failure<K: fmt::Debug>(kind: MutationKind, key: &K, source: StorageError) -> MutationFailure {
    MutationFailure {
        kind,
        key: format!("{key:?}"),
        source,
    }
}
