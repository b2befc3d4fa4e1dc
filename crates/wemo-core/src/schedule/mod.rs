//! Schedule domain types
//!
//! - [`Job`]: One scheduled action against one device
//! - [`Trigger`]: Fixed clock time or a solar anchor with an offset
//! - [`JobRecord`]: The on-disk representation, including legacy spellings
//! - [`SolarSnapshot`]: Today's sunrise/sunset in local wall-clock time

pub mod job;
pub mod record;
pub mod snapshot;

pub use job::{Action, Evaluation, Job, SolarAnchor, Trigger};
pub use record::{JobRecord, OffsetDirection, TriggerKind, TriggerValue};
pub use snapshot::SolarSnapshot;
