//! Per-attempt audit trail.

pub mod logger;

pub use logger::{AttemptLog, AttemptOutcome, AttemptRecord};
