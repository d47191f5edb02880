//! Almanac keeps a local replica of a remotely published itinerary (steps)
//! and its news, and reconciles it against the remote on demand.
//!
//! - [`storage`]: the `SQLite` replica, one observable repository per collection.
//! - [`reconcile`]: diff a fetched collection against the replica and apply it.
//! - [`sync`]: the pending-sync queue that coalesces triggers into runs.
//! - [`remote`]: the remote source, over HTTP.
//! - [`registration`], [`trigger`]: push registration and push message intake.

pub mod config;
pub mod identity;
pub mod model;
pub mod reconcile;
pub mod registration;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod trigger;
