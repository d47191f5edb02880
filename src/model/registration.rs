//! Registration tokens that were successfully posted to the remote.

use serde::{Deserialize, Serialize};

/// A token the remote has accepted. The token itself is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub token: String,
    pub time_created: Option<i64>,
}
