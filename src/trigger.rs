//! Trigger ingestion.
//!
//! A push collaborator hands over raw message bodies; they decode into a
//! [`Trigger`]:
//!
//! ```json
//! {"type": "syncRequested", "forced": true}
//! {"type": "newsAnnounced", "title": "...", "message": "..."}
//! ```
//!
//! Both kinds request a sync. An announcement only ever requests an un-forced
//! one and is handed back for display.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sync::{SyncError, SyncRequest, Synchronizer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trigger {
    SyncRequested {
        #[serde(default)]
        forced: bool,
    },
    NewsAnnounced {
        title: String,
        message: String,
    },
}

/// A news announcement for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub title: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("invalid trigger message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// What a dispatched trigger produced.
#[derive(Debug)]
pub struct Dispatched {
    pub request: SyncRequest,
    pub announcement: Option<Announcement>,
}

impl Trigger {
    /// Decodes a raw push message body.
    pub fn from_json(body: &str) -> Result<Self, TriggerError> {
        Ok(serde_json::from_str(body)?)
    }

    /// The `forced` flag of the sync this trigger requests.
    pub fn forced(&self) -> bool {
        match self {
            Self::SyncRequested { forced } => *forced,
            Self::NewsAnnounced { .. } => false,
        }
    }
}

/// Turns a trigger into a sync request.
pub async fn dispatch(sync: &Synchronizer, trigger: Trigger) -> Result<Dispatched, TriggerError> {
    debug!(?trigger, "dispatching trigger");
    let request = sync.request_sync(trigger.forced()).await?;
    let announcement = match trigger {
        Trigger::SyncRequested { .. } => None,
        Trigger::NewsAnnounced { title, message } => Some(Announcement { title, message }),
    };
    Ok(Dispatched {
        request,
        announcement,
    })
}
