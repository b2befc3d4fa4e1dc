// # Schedule and Settings Store Traits
//
// Persistence contracts for the scheduler's job list and the solar
// provider's coordinates.
//
// ## Implementations
//
// - File-based: [`crate::state::FileScheduleStore`], [`crate::state::FileSettingsStore`]
// - In-memory: [`crate::state::MemoryScheduleStore`], [`crate::state::MemorySettingsStore`]

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::Result;
use crate::schedule::Job;
use crate::traits::GeoCoordinates;

/// Trait for schedule persistence
///
/// The engine reloads the full job list on every tick, so edits made by
/// other processes take effect without a restart.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Load every valid job
    ///
    /// Individual records that fail to parse are skipped (and logged) by
    /// the implementation. An error means the document as a whole could
    /// not be read.
    async fn load_jobs(&self) -> Result<Vec<Job>>;

    /// Record that a job fired on `date`
    ///
    /// Implementations must change only the `last_fired_date` of the job with
    /// this id and leave every other record untouched.
    async fn mark_fired(&self, job_id: &str, date: NaiveDate) -> Result<()>;
}

/// Trait for persisted settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored coordinates, if any
    async fn load_coordinates(&self) -> Result<Option<GeoCoordinates>>;

    /// Persist coordinates, keeping unrelated settings
    async fn save_coordinates(&self, coords: GeoCoordinates) -> Result<()>;
}
