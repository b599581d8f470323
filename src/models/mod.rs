//! Wire and persisted shapes for the parts catalog gateway.
//!
//! A `PartSubmission` is both the request item and the persisted record:
//! what the client sends is what lands in the upstream repository, minus
//! a possible dedup suffix on the title.

pub mod part;
pub mod submission;
