//! The pending-sync queue.
//!
//! A sync moves through `NoPendingSync → Pending → Running → Completed`. The
//! pending flag lives in the `syncs` table, so it survives the process: a
//! record left pending by a crash is picked up again by
//! [`Synchronizer::sync_if_necessary`].
//!
//! Requests coalesce. While a record is pending, [`Synchronizer::request_sync`]
//! hands back that record instead of starting a second run, whatever the
//! `forced` flag says.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::identity::now_millis;
use crate::model::{NewsRecord, StepWithLinks, SyncRecord};
use crate::reconcile::{self, Applied, ReconcileError};
use crate::remote::{RemoteError, RemoteSource};
use crate::storage::{Replica, StorageError};

/// Errors that prevent a sync from being started or recorded.
///
/// Failures inside a run (a fetch timing out, a mutation failing) are not
/// errors at this level; they are reported per collection in [`SyncReport`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("sync task failed: {0}")]
    Task(#[from] JoinError),
}

/// Why one collection was skipped or only partly reconciled.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] RemoteError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("reconciliation task failed: {0}")]
    Task(#[from] JoinError),
}

/// Outcome of one run.
#[derive(Debug)]
pub struct SyncReport {
    /// The record as completed.
    pub sync: SyncRecord,
    pub forced: bool,
    pub steps: Result<Applied, CollectionError>,
    pub news: Result<Applied, CollectionError>,
}

impl SyncReport {
    /// True when both collections were fetched and fully reconciled.
    pub fn is_clean(&self) -> bool {
        self.steps.is_ok() && self.news.is_ok()
    }

    /// Failures by collection name.
    pub fn errors(&self) -> impl Iterator<Item = (&'static str, &CollectionError)> {
        [("steps", &self.steps), ("news", &self.news)]
            .into_iter()
            .filter_map(|(name, result)| result.as_ref().err().map(|e| (name, e)))
    }
}

/// What a sync request turned into.
#[derive(Debug)]
pub enum SyncRequest {
    /// A sync was already pending; this is its record. No new run started.
    Coalesced(SyncRecord),

    /// A run was started for `record`.
    Started {
        record: SyncRecord,
        run: JoinHandle<Result<SyncReport, SyncError>>,
    },
}

impl SyncRequest {
    pub fn record(&self) -> &SyncRecord {
        match self {
            Self::Coalesced(record) | Self::Started { record, .. } => record,
        }
    }

    pub fn is_coalesced(&self) -> bool {
        matches!(self, Self::Coalesced(_))
    }

    /// Waits for the run this request started. `None` when it was coalesced.
    pub async fn wait(self) -> Result<Option<SyncReport>, SyncError> {
        match self {
            Self::Coalesced(_) => Ok(None),
            Self::Started { run, .. } => run.await?.map(Some),
        }
    }
}

/// Drives reconciliation runs against one replica and one remote.
#[derive(Clone)]
pub struct Synchronizer {
    replica: Replica,
    remote: Arc<dyn RemoteSource>,
    fetch_timeout: Duration,
    running: Arc<Mutex<HashSet<String>>>,
}

/// Marks a sync record as being run by this process until dropped.
struct InFlight {
    running: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Synchronizer {
    pub fn new(replica: Replica, remote: Arc<dyn RemoteSource>, fetch_timeout: Duration) -> Self {
        Self {
            replica,
            remote,
            fetch_timeout,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Requests a sync. Coalesces into the pending one if there is one.
    ///
    /// Must be called from within a Tokio runtime; the run is spawned on it.
    pub async fn request_sync(&self, forced: bool) -> Result<SyncRequest, SyncError> {
        let syncs = Arc::clone(&self.replica.syncs);
        let (record, created) = blocking(move || syncs.begin_pending(now_millis())).await?;

        if !created {
            debug!(id = ?record.id, forced, "sync already pending, coalescing");
            return Ok(SyncRequest::Coalesced(record));
        }
        Ok(self.start(record, forced))
    }

    /// Startup check.
    ///
    /// Resumes a pending record that no run in this process owns (left over by
    /// an earlier process). Otherwise requests an un-forced sync if none ever
    /// completed. Returns `None` when there is nothing to do.
    pub async fn sync_if_necessary(&self) -> Result<Option<SyncRequest>, SyncError> {
        let syncs = Arc::clone(&self.replica.syncs);
        let (pending, last) =
            blocking(move || Ok((syncs.get_pending()?, syncs.last_successful()?))).await?;

        if let Some(record) = pending.into_iter().next() {
            return self.resume(record).await;
        }
        if last.is_none() {
            info!("no sync ever completed, requesting one");
            return self.request_sync(false).await.map(Some);
        }
        Ok(None)
    }

    /// The most recently completed sync.
    pub async fn last_successful(&self) -> Result<Option<SyncRecord>, SyncError> {
        let syncs = Arc::clone(&self.replica.syncs);
        blocking(move || syncs.last_successful()).await
    }

    /// Spawns a run for `record` unless this process already runs it.
    fn start(&self, record: SyncRecord, forced: bool) -> SyncRequest {
        match self.claim(&record) {
            Some(guard) => self.spawn(record, guard, forced),
            None => SyncRequest::Coalesced(record),
        }
    }

    /// Resumes a pending record read earlier.
    ///
    /// The record is re-read once claimed: another process may have completed
    /// it since. `None` when it is no longer pending.
    async fn resume(&self, record: SyncRecord) -> Result<Option<SyncRequest>, SyncError> {
        let Some(guard) = self.claim(&record) else {
            return Ok(Some(SyncRequest::Coalesced(record)));
        };
        let syncs = Arc::clone(&self.replica.syncs);
        let id = guard.id.clone();
        match blocking(move || syncs.get(&id)).await? {
            Some(current) if current.pending => {
                info!(id = %guard.id, "resuming pending sync");
                Ok(Some(self.spawn(current, guard, false)))
            }
            _ => {
                debug!(id = %guard.id, "pending sync completed elsewhere");
                Ok(None)
            }
        }
    }

    /// Marks `record` as run by this process, or `None` if a run here owns it.
    fn claim(&self, record: &SyncRecord) -> Option<InFlight> {
        // Stored records always carry an id; nothing to run without one.
        let id = record.id.clone()?;
        let claimed = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        if !claimed {
            debug!(%id, "sync already running in this process");
            return None;
        }
        Some(InFlight {
            running: Arc::clone(&self.running),
            id,
        })
    }

    fn spawn(&self, record: SyncRecord, guard: InFlight, forced: bool) -> SyncRequest {
        let run = tokio::spawn(self.clone().run(guard, forced));
        SyncRequest::Started { record, run }
    }

    async fn run(self, guard: InFlight, forced: bool) -> Result<SyncReport, SyncError> {
        let id = guard.id.clone();
        info!(%id, forced, "sync started");

        let (steps, news) = tokio::join!(self.sync_steps(), self.sync_news());
        for (collection, result) in [("steps", &steps), ("news", &news)] {
            match result {
                Ok(applied) => info!(%id, collection, %applied, "reconciled"),
                Err(e) => warn!(%id, collection, "{e}"),
            }
        }

        let syncs = Arc::clone(&self.replica.syncs);
        let sync = blocking(move || syncs.complete(&id, now_millis()))
            .await
            .inspect_err(|e| warn!(id = %guard.id, "could not complete sync, left pending: {e}"))?;
        info!(id = %guard.id, "sync completed");

        Ok(SyncReport {
            sync,
            forced,
            steps,
            news,
        })
    }

    async fn sync_steps(&self) -> Result<Applied, CollectionError> {
        let payload = self.fetch("steps", self.remote.fetch_steps()).await?;
        let steps = Arc::clone(&self.replica.steps);
        let applied = tokio::task::spawn_blocking(move || {
            reconcile::reconcile::<StepWithLinks, _>(&*steps, payload)
        })
        .await??;
        Ok(applied)
    }

    async fn sync_news(&self) -> Result<Applied, CollectionError> {
        let payload = self.fetch("news", self.remote.fetch_news()).await?;
        let news = Arc::clone(&self.replica.news);
        let applied = tokio::task::spawn_blocking(move || {
            reconcile::reconcile::<NewsRecord, _>(&*news, payload)
        })
        .await??;
        Ok(applied)
    }

    async fn fetch<T>(
        &self,
        what: &'static str,
        request: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.fetch_timeout, request)
            .await
            .map_err(|_| RemoteError::Timeout(what, self.fetch_timeout))?
    }
}

/// Runs blocking storage work off the async threads.
async fn blocking<T, F>(work: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}
