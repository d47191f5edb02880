//! Registration tokens: post once, remember what the remote accepted.

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::model::RegistrationRecord;
use crate::remote::{RemoteError, RemoteSource};
use crate::storage::{RegistrationsRepository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("could not post token: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("registration task failed: {0}")]
    Task(#[from] JoinError),
}

/// Posts registration tokens and records the accepted ones.
pub struct TokenRegistrar {
    registrations: Arc<RegistrationsRepository>,
    remote: Arc<dyn RemoteSource>,
}

impl TokenRegistrar {
    pub fn new(registrations: Arc<RegistrationsRepository>, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            registrations,
            remote,
        }
    }

    /// Registers `token` with the remote.
    ///
    /// A token already recorded is not posted again unless `force` is set;
    /// that case returns `Ok(false)`. A refused or failed post records
    /// nothing, so the next attempt posts again.
    pub async fn register(&self, token: &str, force: bool) -> Result<bool, RegistrationError> {
        if !force && self.known(token).await? {
            debug!("token already registered");
            return Ok(false);
        }

        let accepted = self
            .remote
            .post_registration_token(token)
            .await
            .inspect_err(|e| warn!("token post failed: {e}"))?;
        if !accepted {
            warn!("remote refused registration token");
            return Ok(false);
        }

        let registrations = Arc::clone(&self.registrations);
        let record = RegistrationRecord {
            token: token.to_string(),
            time_created: None,
        };
        tokio::task::spawn_blocking(move || {
            // A forced re-post of a known token replaces its record.
            registrations.delete(&record.token)?;
            registrations.add(record)
        })
        .await??;
        info!("registration token accepted");
        Ok(true)
    }

    async fn known(&self, token: &str) -> Result<bool, RegistrationError> {
        let registrations = Arc::clone(&self.registrations);
        let token = token.to_string();
        let found = tokio::task::spawn_blocking(move || registrations.get_by_token(&token))
            .await??;
        Ok(found.is_some())
    }
}
