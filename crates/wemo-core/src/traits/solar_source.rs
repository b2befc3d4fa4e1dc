// # Solar Source Traits
//
// External lookups behind the solar time cache.
//
// ## Implementations
//
// - ipinfo.io geolocation and sunrise-sunset.org: `wemo-solar` crate

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::schedule::SolarSnapshot;
use crate::{Error, Result};

/// Latitude/longitude pair in decimal degrees
///
/// Older settings files stored both values as strings, so deserialization
/// accepts either numbers or numeric strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    #[serde(deserialize_with = "number_or_text")]
    pub lat: f64,
    #[serde(deserialize_with = "number_or_text")]
    pub lng: f64,
}

impl GeoCoordinates {
    /// Create validated coordinates
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let coords = Self { lat, lng };
        coords.validate()?;
        Ok(coords)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::invalid_input(format!("latitude out of range: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::invalid_input(format!("longitude out of range: {}", self.lng)));
        }
        Ok(())
    }
}

fn number_or_text<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Sunrise and sunset instants for one date, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimesUtc {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Best-effort IP geolocation
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Look up the approximate coordinates of this network
    async fn locate(&self) -> Result<GeoCoordinates>;
}

/// Sunrise/sunset lookup service
#[async_trait]
pub trait SunTimesSource: Send + Sync {
    /// Fetch sunrise and sunset for `date` at `coords`
    async fn fetch(&self, coords: GeoCoordinates, date: NaiveDate) -> Result<SunTimesUtc>;
}

/// Today's solar anchors as seen by the scheduler
///
/// `None` means the times are unknown right now; solar-anchored jobs are
/// skipped for that tick.
#[async_trait]
pub trait SolarTimes: Send + Sync {
    async fn solar_times(&self) -> Option<SolarSnapshot>;
}
