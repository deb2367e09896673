//! Core abstractions for commentsync.
//!
//! This module provides the clock, timestamp encoding and the traits shared
//! by entities and the conflict resolver.

mod clock;
pub mod datetime;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use traits::{FieldMerge, FieldMerger, Syncable};
