//! Steps of the itinerary and their links.

use serde::{Deserialize, Serialize};

/// One step of the itinerary.
///
/// `position` is assigned by the remote source and is what reconciliation
/// matches on. The identifier is local and survives content refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: Option<String>,
    pub position: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub possible_date: String,
}

/// A link attached to a step. Replaced wholesale whenever its step changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLinkRecord {
    pub id: Option<String>,
    pub step_id: String,
    pub title: String,
    pub url: String,
}

/// A step together with its links, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWithLinks {
    pub step: StepRecord,
    pub links: Vec<StepLinkRecord>,
}
