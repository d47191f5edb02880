//! News items.

use serde::{Deserialize, Serialize};

/// A news item. The remote issues no identifier, so `(title, date)` is the
/// merge key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    /// Publication time in Unix seconds, as the remote publishes it.
    pub date: i64,
    pub tldr: Option<String>,
}
