//! Core data model for almanac.
//!
//! Two families of types live here: the records held in the local replica
//! (steps, links, news, syncs, registrations) and the payloads the remote
//! source hands back. Records carry an optional identifier that is assigned on
//! first insertion; payloads never carry one.

mod news;
mod payload;
mod registration;
mod step;
mod sync;

pub use news::NewsRecord;
pub use payload::{LinkPayload, NewsPayload, StepPayload};
pub use registration::RegistrationRecord;
pub use step::{StepLinkRecord, StepRecord, StepWithLinks};
pub use sync::SyncRecord;
