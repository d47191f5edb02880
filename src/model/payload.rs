//! Payloads: what the remote source returns.
//!
//! Field names follow the remote's JSON (camelCase). Every field is required
//! except the news summary; a payload missing one fails to decode.

use serde::{Deserialize, Serialize};

use super::{NewsRecord, StepLinkRecord, StepRecord};

/// A news item as published remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsPayload {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tldr: Option<String>,
    pub date: i64,
}

/// A step as published remotely, links included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    pub title: String,
    pub description: String,
    pub possible_date: String,
    pub position: i64,
    pub completed: bool,
    #[serde(default)]
    pub links: Vec<LinkPayload>,
}

/// A link inside a [`StepPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub title: String,
    pub url: String,
}

impl NewsPayload {
    /// Converts into a record carrying `id` (or none, for an insert).
    pub fn to_record(&self, id: Option<String>) -> NewsRecord {
        NewsRecord {
            id,
            title: self.title.clone(),
            url: self.url.clone(),
            date: self.date,
            tldr: self.tldr.clone(),
        }
    }
}

impl StepPayload {
    /// Converts the step fields into a record carrying `id`.
    pub fn to_record(&self, id: Option<String>) -> StepRecord {
        StepRecord {
            id,
            position: self.position,
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            possible_date: self.possible_date.clone(),
        }
    }

    /// Converts the links into records owned by `step_id`.
    pub fn link_records(&self, step_id: &str) -> Vec<StepLinkRecord> {
        self.links
            .iter()
            .map(|link| StepLinkRecord {
                id: None,
                step_id: step_id.to_string(),
                title: link.title.clone(),
                url: link.url.clone(),
            })
            .collect()
    }
}
