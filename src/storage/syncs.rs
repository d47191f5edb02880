//! Sync record storage: the pending flag and the audit log.
//!
//! The pending flag is the only thing that decides whether a new
//! reconciliation run may start. [`Repository::begin_pending`] reads and sets
//! it inside one transaction while holding the collection's lock, so two
//! triggers racing each other cannot both see "nothing pending".

use rusqlite::{Row, TransactionBehavior, types::Value};

use crate::identity::{id_if_absent, timestamp_if_absent};
use crate::model::SyncRecord;

use super::{Record, Repository, Result, StorageError, insert_row, query_one, query_rows};

impl Record for SyncRecord {
    const TABLE: &'static str = "syncs";
    const COLUMNS: &'static [&'static str] = &["pending", "time_created", "time_synced"];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn prepare(self) -> Self {
        Self {
            id: Some(id_if_absent(self.id)),
            time_created: Some(timestamp_if_absent(self.time_created)),
            ..self
        }
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::from(self.pending),
            Value::from(self.time_created),
            Value::from(self.time_synced),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            pending: row.get(1)?,
            time_created: row.get(2)?,
            time_synced: row.get(3)?,
        })
    }
}

impl Repository<SyncRecord> {
    /// Pending records, oldest first. Normally zero or one.
    pub fn get_pending(&self) -> Result<Vec<SyncRecord>> {
        let conn = self.lock()?;
        query_rows(&conn, Some("pending != 0 ORDER BY time_created ASC"), [])
    }

    /// Completed records, in the order they completed.
    pub fn get_successful(&self) -> Result<Vec<SyncRecord>> {
        let conn = self.lock()?;
        query_rows(&conn, Some("pending = 0 ORDER BY time_synced ASC"), [])
    }

    /// The most recently completed record.
    pub fn last_successful(&self) -> Result<Option<SyncRecord>> {
        let conn = self.lock()?;
        query_one(&conn, "pending = 0 ORDER BY time_synced DESC", [])
    }

    /// Returns the outstanding pending record, or creates one stamped `now`.
    ///
    /// The boolean is `true` when the record was created by this call, which
    /// makes the caller the one responsible for running it.
    pub fn begin_pending(&self, now: i64) -> Result<(SyncRecord, bool)> {
        let (record, created) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<SyncRecord> =
                query_one(&tx, "pending != 0 ORDER BY time_created ASC", [])?;
            if let Some(existing) = existing {
                (existing, false)
            } else {
                let record = SyncRecord {
                    time_created: Some(now),
                    ..SyncRecord::pending()
                }
                .prepare();
                insert_row(&tx, &record)?;
                tx.commit()?;
                (record, true)
            }
        };
        if created {
            self.notify();
        }
        Ok((record, created))
    }

    /// Marks a record completed at `now` and returns it.
    pub fn complete(&self, id: &str, now: i64) -> Result<SyncRecord> {
        let record = {
            let conn = self.lock()?;
            let rows = conn.execute(
                "UPDATE syncs SET pending = 0, time_synced = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            if rows == 0 {
                return Err(StorageError::NotFound {
                    table: SyncRecord::TABLE,
                    id: id.to_string(),
                });
            }
            query_one(&conn, "id = ?1", [id])?.ok_or_else(|| StorageError::NotFound {
                table: SyncRecord::TABLE,
                id: id.to_string(),
            })?
        };
        self.notify();
        Ok(record)
    }

    /// Deletes all but the `keep` most recently completed records.
    ///
    /// Pending records are never pruned.
    pub fn prune_completed(&self, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let rows = {
            let conn = self.lock()?;
            conn.execute(
                "DELETE FROM syncs
                 WHERE pending = 0
                   AND id NOT IN (
                       SELECT id FROM syncs WHERE pending = 0
                       ORDER BY time_synced DESC LIMIT ?1
                   )",
                [keep],
            )?
        };
        if rows > 0 {
            self.notify();
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::storage::tests::test_replica;

    use super::*;

    fn completed(time_created: i64, time_synced: i64) -> SyncRecord {
        SyncRecord {
            id: None,
            pending: false,
            time_created: Some(time_created),
            time_synced: Some(time_synced),
        }
    }

    #[test]
    fn add_stamps_creation_time() {
        let (_dir, replica) = test_replica();

        let stored = replica.syncs.add(SyncRecord::pending()).unwrap();

        assert!(stored.id.is_some());
        assert!(stored.time_created.is_some());
        assert_eq!(stored.time_synced, None);
    }

    #[test]
    fn begin_pending_creates_once() {
        let (_dir, replica) = test_replica();

        let (first, created_first) = replica.syncs.begin_pending(10).unwrap();
        let (second, created_second) = replica.syncs.begin_pending(20).unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first, second);
        assert_eq!(first.time_created, Some(10));
        assert_eq!(replica.syncs.get_all().unwrap().len(), 1);
    }

    #[test]
    fn begin_pending_after_completion_starts_fresh() {
        let (_dir, replica) = test_replica();
        let (first, _) = replica.syncs.begin_pending(10).unwrap();
        replica
            .syncs
            .complete(first.id.as_deref().unwrap(), 15)
            .unwrap();

        let (second, created) = replica.syncs.begin_pending(20).unwrap();

        assert!(created);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn concurrent_begin_pending_creates_exactly_one() {
        let (_dir, replica) = test_replica();
        let syncs = Arc::clone(&replica.syncs);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let syncs = Arc::clone(&syncs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    syncs.begin_pending(i).unwrap().1
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();

        assert_eq!(created, 1);
        assert_eq!(syncs.get_pending().unwrap().len(), 1);
    }

    #[test]
    fn complete_clears_pending_and_stamps_sync_time() {
        let (_dir, replica) = test_replica();
        let (record, _) = replica.syncs.begin_pending(10).unwrap();

        let done = replica
            .syncs
            .complete(record.id.as_deref().unwrap(), 42)
            .unwrap();

        assert!(!done.pending);
        assert_eq!(done.time_created, Some(10));
        assert_eq!(done.time_synced, Some(42));
        assert!(replica.syncs.get_pending().unwrap().is_empty());
    }

    #[test]
    fn complete_unknown_record_fails() {
        let (_dir, replica) = test_replica();

        let err = replica.syncs.complete("missing", 1).unwrap_err();

        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn last_successful_is_latest_completed() {
        let (_dir, replica) = test_replica();
        replica.syncs.add(completed(10, 11)).unwrap();
        let latest = replica.syncs.add(completed(20, 22)).unwrap();
        replica.syncs.begin_pending(30).unwrap();

        assert_eq!(replica.syncs.last_successful().unwrap(), Some(latest));
        assert_eq!(replica.syncs.get_successful().unwrap().len(), 2);
    }

    #[test]
    fn last_successful_none_without_completions() {
        let (_dir, replica) = test_replica();
        replica.syncs.begin_pending(1).unwrap();

        assert_eq!(replica.syncs.last_successful().unwrap(), None);
    }

    #[test]
    fn prune_keeps_newest_completed_and_all_pending() {
        let (_dir, replica) = test_replica();
        for i in 0..5 {
            replica.syncs.add(completed(i, i * 10)).unwrap();
        }
        let (pending, _) = replica.syncs.begin_pending(100).unwrap();

        let pruned = replica.syncs.prune_completed(2).unwrap();

        assert_eq!(pruned, 3);
        let kept: Vec<_> = replica
            .syncs
            .get_successful()
            .unwrap()
            .into_iter()
            .map(|s| s.time_synced)
            .collect();
        assert_eq!(kept, vec![Some(30), Some(40)]);
        assert_eq!(replica.syncs.get_pending().unwrap(), vec![pending]);
    }
}
