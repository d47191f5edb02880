//! Sync records: the durable audit log of synchronization attempts.

use serde::{Deserialize, Serialize};

/// One synchronization attempt.
///
/// A record is created pending when a trigger arrives with nothing outstanding
/// and flips to completed once its reconciliation pass finishes, whatever the
/// outcome of the individual fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub id: Option<String>,
    pub pending: bool,
    pub time_created: Option<i64>,
    pub time_synced: Option<i64>,
}

impl SyncRecord {
    /// A fresh pending record, not yet persisted.
    pub fn pending() -> Self {
        Self {
            id: None,
            pending: true,
            time_created: None,
            time_synced: None,
        }
    }
}
