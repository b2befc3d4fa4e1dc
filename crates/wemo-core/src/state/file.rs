// # File Stores
//
// JSON-file implementations of ScheduleStore and SettingsStore.
//
// ## Crash Safety
//
// - Atomic writes: new content goes to a `.tmp` file which is then renamed
// - Backup: the previous document is copied to `.backup` before each rename
// - Settings recovery: a corrupt settings file falls back to its backup
//
// Schedules do not fall back to the backup. A stale backup could re-arm
// jobs that already fired, so a corrupt schedule document fails the load
// and the next tick tries again.
//
// ## Concurrent Writers
//
// The desktop editor may rewrite `schedules.json` while the scheduler runs.
// `mark_fired` re-reads the document right before writing and only touches
// the fire date of one record, keeping the unguarded window small. Last
// writer wins.
//
// ## Job Ids
//
// Fire dates are keyed by job id. When several records share an id only the
// first one is loaded and stamped; the rest are skipped with a warning.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::schedule::{Job, JobRecord};
use crate::traits::{GeoCoordinates, ScheduleStore, SettingsStore};
use crate::{Error, Result};

/// Schedule store backed by a JSON array on disk
///
/// # Example
///
/// ```rust,no_run
/// use wemo_core::state::FileScheduleStore;
/// use wemo_core::traits::ScheduleStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileScheduleStore::new("/home/me/.local/share/WemoOps/schedules.json").await?;
///     for job in store.load_jobs().await? {
///         println!("{} -> {}", job.device, job.action);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileScheduleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileScheduleStore {
    /// Open a schedule store, creating parent directories if needed
    ///
    /// A missing file is not an error; it reads as an empty schedule.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw array of records
    async fn read_records(&self) -> Result<Option<Vec<Value>>> {
        let Some(document) = read_json(&self.path).await? else {
            return Ok(None);
        };

        match document {
            Value::Array(records) => Ok(Some(records)),
            other => Err(Error::persistence(format!(
                "schedule file {} must contain a JSON array, found {}",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let Some(records) = self.read_records().await? else {
            tracing::debug!("Schedule file does not exist: {}", self.path.display());
            return Ok(Vec::new());
        };

        let mut jobs = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        for (index, value) in records.into_iter().enumerate() {
            let parsed = serde_json::from_value::<JobRecord>(value)
                .map_err(Error::from)
                .and_then(Job::try_from);

            match parsed {
                Ok(job) if !seen.insert(job.id.clone()) => tracing::warn!(
                    "Skipping schedule entry #{}: id {:?} is already used by an earlier entry",
                    index,
                    job.id
                ),
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("Skipping schedule entry #{}: {}", index, e),
            }
        }

        Ok(jobs)
    }

    async fn mark_fired(&self, job_id: &str, date: NaiveDate) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_records().await?.ok_or_else(|| {
            Error::persistence(format!(
                "schedule file {} disappeared",
                self.path.display()
            ))
        })?;

        let mut matched = false;
        for value in records.iter_mut() {
            // Same filter as load_jobs: the first loadable record with this id
            let loaded = serde_json::from_value::<JobRecord>(value.clone())
                .map_err(Error::from)
                .and_then(Job::try_from);
            let Ok(job) = loaded else {
                continue;
            };
            if job.id != job_id {
                continue;
            }
            if let Value::Object(fields) = value {
                // Keep whichever key the record already uses
                let key = if fields.contains_key("last_run") {
                    "last_run"
                } else {
                    "last_fired_date"
                };
                fields.insert(key.to_string(), Value::String(date.to_string()));
                matched = true;
                break;
            }
        }

        if !matched {
            return Err(Error::persistence(format!(
                "job {:?} is no longer in the schedule",
                job_id
            )));
        }

        let json = serde_json::to_string_pretty(&Value::Array(records))?;
        write_atomic(&self.path, &json).await?;
        tracing::debug!("Recorded fire date {} for job {}", date, job_id);
        Ok(())
    }
}

/// Settings store backed by a JSON object on disk
///
/// Only `lat` and `lng` are interpreted; every other key is preserved.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Load the settings object, recovering from the backup if corrupt
    async fn read_settings(&self) -> Result<Map<String, Value>> {
        match read_json(&self.path).await {
            Ok(Some(Value::Object(map))) => return Ok(map),
            Ok(None) => return Ok(Map::new()),
            Ok(Some(other)) => {
                tracing::warn!(
                    "Settings file {} holds {} instead of an object. Attempting recovery from backup.",
                    self.path.display(),
                    json_kind(&other)
                );
            }
            Err(e @ Error::Json(_)) => {
                tracing::warn!(
                    "Settings file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );
            }
            Err(e) => return Err(e),
        }

        let backup = backup_path(&self.path);
        match read_json(&backup).await {
            Ok(Some(Value::Object(map))) => {
                tracing::info!("Recovered settings from backup");
                Ok(map)
            }
            Ok(_) => {
                tracing::warn!("No usable settings backup. Starting with empty settings.");
                Ok(Map::new())
            }
            Err(e) => {
                tracing::error!("Settings backup also unreadable: {}. Starting with empty settings.", e);
                Ok(Map::new())
            }
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load_coordinates(&self) -> Result<Option<GeoCoordinates>> {
        let settings = self.read_settings().await?;
        if !settings.contains_key("lat") || !settings.contains_key("lng") {
            return Ok(None);
        }

        let parsed = serde_json::from_value::<GeoCoordinates>(Value::Object(settings))
            .map_err(Error::from)
            .and_then(|coords| coords.validate().map(|_| coords));

        match parsed {
            Ok(coords) => Ok(Some(coords)),
            Err(e) => {
                tracing::warn!("Ignoring stored coordinates: {}", e);
                Ok(None)
            }
        }
    }

    async fn save_coordinates(&self, coords: GeoCoordinates) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut settings = self.read_settings().await?;
        settings.insert("lat".to_string(), serde_json::to_value(coords.lat)?);
        settings.insert("lng".to_string(), serde_json::to_value(coords.lng)?);

        let json = serde_json::to_string_pretty(&Value::Object(settings))?;
        write_atomic(&self.path, &json).await
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::config(format!(
                "Failed to create data directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Read and parse a JSON document; `None` if the file does not exist
async fn read_json(path: &Path) -> Result<Option<Value>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&content)?))
}

/// Write-then-rename with a backup of the previous document
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(contents.as_bytes()).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to write to temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.flush().await.map_err(|e| {
            Error::persistence(format!(
                "Failed to flush temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    if path.exists()
        && let Err(e) = fs::copy(path, backup_path(path)).await
    {
        tracing::warn!("Failed to create backup: {}", e);
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::persistence(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::trace!("Wrote {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    temp.set_extension("tmp");
    temp
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.to_path_buf();
    backup.set_extension("backup");
    backup
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
