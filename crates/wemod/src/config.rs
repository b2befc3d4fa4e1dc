//! Environment configuration for wemod
//!
//! Every setting is an optional `WEMO_*` variable. Unset variables keep the
//! `AgentConfig` defaults; set ones are range-checked before anything starts.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

use wemo_core::AgentConfig;
use wemo_core::traits::GeoCoordinates;

/// Daemon configuration as read from the environment
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub scan_cidr: Option<Ipv4Net>,
    pub scan_interface: Option<String>,
    pub scan_concurrency: Option<usize>,
    pub probe_timeout_ms: Option<u64>,
    pub control_port: Option<u16>,
    pub quick_discovery: Option<bool>,
    pub rescan_interval_secs: Option<u64>,
    pub liveness_interval_secs: Option<u64>,
    pub tick_interval_secs: Option<u64>,
    pub action_timeout_secs: Option<u64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            data_dir: var("WEMO_DATA_DIR").map(PathBuf::from),
            scan_cidr: parse_var(&var, "WEMO_SCAN_CIDR")?,
            scan_interface: var("WEMO_SCAN_INTERFACE"),
            scan_concurrency: parse_var(&var, "WEMO_SCAN_CONCURRENCY")?,
            probe_timeout_ms: parse_var(&var, "WEMO_PROBE_TIMEOUT_MS")?,
            control_port: parse_var(&var, "WEMO_CONTROL_PORT")?,
            quick_discovery: var("WEMO_QUICK_DISCOVERY")
                .map(|v| parse_bool("WEMO_QUICK_DISCOVERY", &v))
                .transpose()?,
            rescan_interval_secs: parse_var(&var, "WEMO_RESCAN_INTERVAL_SECS")?,
            liveness_interval_secs: parse_var(&var, "WEMO_LIVENESS_INTERVAL_SECS")?,
            tick_interval_secs: parse_var(&var, "WEMO_TICK_INTERVAL_SECS")?,
            action_timeout_secs: parse_var(&var, "WEMO_ACTION_TIMEOUT_SECS")?,
            lat: parse_var(&var, "WEMO_LAT")?,
            lng: parse_var(&var, "WEMO_LNG")?,
            log_level: var("WEMO_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_range("WEMO_SCAN_CONCURRENCY", self.scan_concurrency, 1, 1024)?;
        check_range("WEMO_PROBE_TIMEOUT_MS", self.probe_timeout_ms, 50, 10_000)?;
        check_range("WEMO_RESCAN_INTERVAL_SECS", self.rescan_interval_secs, 60, 86_400)?;
        check_range("WEMO_LIVENESS_INTERVAL_SECS", self.liveness_interval_secs, 1, 3600)?;
        check_range("WEMO_TICK_INTERVAL_SECS", self.tick_interval_secs, 1, 59)?;
        check_range("WEMO_ACTION_TIMEOUT_SECS", self.action_timeout_secs, 1, 120)?;

        if self.control_port == Some(0) {
            anyhow::bail!("WEMO_CONTROL_PORT must be between 1 and 65535. Got: 0");
        }

        if self.scan_cidr.is_some() && self.scan_interface.is_some() {
            anyhow::bail!("Set either WEMO_SCAN_CIDR or WEMO_SCAN_INTERFACE, not both");
        }

        if let Some(cidr) = self.scan_cidr
            && cidr.prefix_len() < 20
        {
            anyhow::bail!(
                "WEMO_SCAN_CIDR {} is too large. Use a /20 or smaller range.",
                cidr
            );
        }

        if let Some(coords) = self.coordinates()? {
            coords
                .validate()
                .map_err(|e| anyhow::anyhow!("WEMO_LAT/WEMO_LNG: {}", e))?;
        }

        self.level()?;
        Ok(())
    }

    /// Fixed coordinates, if both halves are set
    pub fn coordinates(&self) -> Result<Option<GeoCoordinates>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Ok(Some(GeoCoordinates { lat, lng })),
            (None, None) => Ok(None),
            _ => anyhow::bail!("WEMO_LAT and WEMO_LNG must be set together"),
        }
    }

    /// Tracing level from `WEMO_LOG_LEVEL`
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "WEMO_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Overlay the environment onto the library defaults
    pub fn agent_config(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::default();

        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }

        config.scan.cidr = self.scan_cidr;
        config.scan.interface = self.scan_interface.clone();
        if let Some(concurrency) = self.scan_concurrency {
            config.scan.max_concurrency = concurrency;
        }
        if let Some(timeout) = self.probe_timeout_ms {
            config.scan.probe_timeout_ms = timeout;
        }
        if let Some(port) = self.control_port {
            config.scan.control_port = port;
            if !config.scan.description_ports.contains(&port) {
                config.scan.description_ports.insert(0, port);
            }
        }
        if let Some(quick) = self.quick_discovery {
            config.scan.quick_discovery = quick;
        }
        if let Some(secs) = self.rescan_interval_secs {
            config.scan.rescan_interval_secs = secs;
        }
        if let Some(secs) = self.liveness_interval_secs {
            config.scan.liveness_interval_secs = secs;
        }

        if let Some(secs) = self.tick_interval_secs {
            config.scheduler.tick_interval_secs = secs;
        }
        if let Some(secs) = self.action_timeout_secs {
            config.scheduler.action_timeout_secs = secs;
        }

        config.solar.coordinates = self.coordinates()?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, raw),
    }
}

fn check_range<T>(key: &str, value: Option<T>, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if let Some(value) = value
        && (value < min || value > max)
    {
        anyhow::bail!("{} must be between {} and {}. Got: {}", key, min, max, value);
    }
    Ok(())
}
