// # Memory Stores
//
// In-memory implementations of ScheduleStore and SettingsStore.
//
// ## When to Use
//
// - Testing environments
// - Embedding the scheduler in a process that owns its own persistence
//
// Like the file store, only the first job with a given id is loaded.
// Nothing survives a restart. Clones share the same underlying state, so a
// test can keep one handle while the engine owns another.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::schedule::Job;
use crate::traits::{GeoCoordinates, ScheduleStore, SettingsStore};
use crate::{Error, Result};

/// In-memory schedule store
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduleStore {
    jobs: Arc<RwLock<Vec<Job>>>,
    fail_writes: Arc<AtomicBool>,
    mark_fired_calls: Arc<AtomicUsize>,
}

impl MemoryScheduleStore {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(jobs)),
            ..Self::default()
        }
    }

    /// Replace the whole job list, as an editor saving the file would
    pub async fn set_jobs(&self, jobs: Vec<Job>) {
        *self.jobs.write().await = jobs;
    }

    /// Current job list, including recorded fire dates
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    /// Make every subsequent `mark_fired` fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `mark_fired` calls, failed ones included
    pub fn mark_fired_calls(&self) -> usize {
        self.mark_fired_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut seen = HashSet::new();
        Ok(jobs
            .iter()
            .filter(|job| seen.insert(job.id.as_str()))
            .cloned()
            .collect())
    }

    async fn mark_fired(&self, job_id: &str, date: NaiveDate) -> Result<()> {
        self.mark_fired_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("simulated write failure"));
        }

        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or_else(|| Error::persistence(format!("job {:?} not found", job_id)))?;
        job.last_fired_date = Some(date);
        Ok(())
    }
}

/// In-memory settings store
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    coords: Arc<RwLock<Option<GeoCoordinates>>>,
    saves: Arc<AtomicUsize>,
}

impl MemorySettingsStore {
    pub fn new(coords: Option<GeoCoordinates>) -> Self {
        Self {
            coords: Arc::new(RwLock::new(coords)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `save_coordinates` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load_coordinates(&self) -> Result<Option<GeoCoordinates>> {
        Ok(*self.coords.read().await)
    }

    async fn save_coordinates(&self, coords: GeoCoordinates) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.coords.write().await = Some(coords);
        Ok(())
    }
}
