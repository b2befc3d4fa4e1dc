//! Configuration types for discovery and scheduling
//!
//! This module defines all configuration structures used throughout the crate.
//! Every field has a default, so an empty JSON object is a valid configuration.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::traits::GeoCoordinates;

/// Directory name used under the platform data directory
pub const APP_DIR_NAME: &str = "WemoOps";

/// Main agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub solar: SolarConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl AgentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.scan.validate()?;
        self.scheduler.validate()?;
        self.solar.validate()?;
        Ok(())
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// TCP port probed on every host during the deep scan
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Ports tried, in order, when fetching a device description
    #[serde(default = "default_description_ports")]
    pub description_ports: Vec<u16>,

    /// Per-host TCP connect timeout
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum probes in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Largest subnet (in host addresses) the scanner accepts
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,

    /// Time bound for one description fetch
    #[serde(default = "default_identify_timeout_ms")]
    pub identify_timeout_ms: u64,

    /// Maximum identifications in flight at once
    #[serde(default = "default_identify_concurrency")]
    pub identify_concurrency: usize,

    /// Run broadcast discovery before the deep scan
    #[serde(default = "default_true")]
    pub quick_discovery: bool,

    /// How long to collect broadcast discovery responses
    #[serde(default = "default_quick_discovery_timeout_ms")]
    pub quick_discovery_timeout_ms: u64,

    /// Interval between periodic discovery passes
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,

    /// Interval between liveness checks of known devices
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,

    /// Fixed subnet instead of interface detection
    #[serde(default)]
    pub cidr: Option<Ipv4Net>,

    /// Restrict interface detection to one interface
    #[serde(default)]
    pub interface: Option<String>,
}

impl ScanConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms)
    }

    pub fn quick_discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_discovery_timeout_ms)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.control_port == 0 {
            return Err(crate::Error::config("Control port must be > 0"));
        }
        if self.description_ports.is_empty() || self.description_ports.contains(&0) {
            return Err(crate::Error::config(
                "Description ports must be a non-empty list of non-zero ports",
            ));
        }
        if self.probe_timeout_ms == 0 || self.identify_timeout_ms == 0 {
            return Err(crate::Error::config("Scan timeouts must be > 0"));
        }
        if self.max_concurrency == 0 || self.identify_concurrency == 0 {
            return Err(crate::Error::config("Scan concurrency must be > 0"));
        }
        if self.max_hosts == 0 {
            return Err(crate::Error::config("Maximum scan size must be > 0"));
        }
        if self.rescan_interval_secs == 0 || self.liveness_interval_secs == 0 {
            return Err(crate::Error::config("Discovery intervals must be > 0"));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            description_ports: default_description_ports(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            max_hosts: default_max_hosts(),
            identify_timeout_ms: default_identify_timeout_ms(),
            identify_concurrency: default_identify_concurrency(),
            quick_discovery: true,
            quick_discovery_timeout_ms: default_quick_discovery_timeout_ms(),
            rescan_interval_secs: default_rescan_interval_secs(),
            liveness_interval_secs: default_liveness_interval_secs(),
            cidr: None,
            interface: None,
        }
    }
}

/// Scheduler engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time between ticks
    ///
    /// Must stay below one minute so every trigger minute is observed.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Time bound for one device action
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(1..60).contains(&self.tick_interval_secs) {
            return Err(crate::Error::config(format!(
                "Tick interval must be between 1 and 59 seconds, got {}",
                self.tick_interval_secs
            )));
        }
        if self.action_timeout_secs == 0 {
            return Err(crate::Error::config("Action timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Solar time provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarConfig {
    /// Time bound for the one-off geolocation lookup
    #[serde(default = "default_geolocation_timeout_ms")]
    pub geolocation_timeout_ms: u64,

    /// Time bound for one sunrise/sunset fetch
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Quiet period after a failed lookup
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,

    /// Fixed coordinates; skips geolocation entirely
    #[serde(default)]
    pub coordinates: Option<GeoCoordinates>,
}

impl SolarConfig {
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.geolocation_timeout_ms == 0 || self.fetch_timeout_ms == 0 {
            return Err(crate::Error::config("Solar lookup timeouts must be > 0"));
        }
        if let Some(coords) = &self.coordinates {
            coords
                .validate()
                .map_err(|e| crate::Error::config(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            geolocation_timeout_ms: default_geolocation_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            failure_backoff_secs: default_failure_backoff_secs(),
            coordinates: None,
        }
    }
}

/// Where schedules, settings and the instance lock live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.data_dir.join("schedules.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("wemod.lock")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Platform data directory for the app
///
/// - Windows: `%APPDATA%\WemoOps`
/// - macOS: `~/Library/Application Support/WemoOps`
/// - Others: `$XDG_DATA_HOME/WemoOps`, falling back to `~/.local/share/WemoOps`
pub fn default_data_dir() -> PathBuf {
    let env_dir = |name: &str| {
        std::env::var_os(name)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };

    let base = if cfg!(windows) {
        env_dir("APPDATA")
    } else if cfg!(target_os = "macos") {
        env_dir("HOME").map(|home| home.join("Library").join("Application Support"))
    } else {
        env_dir("XDG_DATA_HOME")
            .or_else(|| env_dir("HOME").map(|home| home.join(".local").join("share")))
    };

    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

fn default_control_port() -> u16 {
    49153
}

fn default_description_ports() -> Vec<u16> {
    vec![49153, 49152, 49154]
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_max_concurrency() -> usize {
    100
}

fn default_max_hosts() -> usize {
    4096
}

fn default_identify_timeout_ms() -> u64 {
    3000
}

fn default_identify_concurrency() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_quick_discovery_timeout_ms() -> u64 {
    3000
}

fn default_rescan_interval_secs() -> u64 {
    600
}

fn default_liveness_interval_secs() -> u64 {
    15
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_action_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_geolocation_timeout_ms() -> u64 {
    2000
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_failure_backoff_secs() -> u64 {
    300
}
