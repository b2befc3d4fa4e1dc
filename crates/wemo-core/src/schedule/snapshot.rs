use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::SolarAnchor;

/// Sunrise and sunset for one calendar date, in local wall-clock time
///
/// Times carry minute precision; seconds are always zero. A snapshot is
/// only meaningful for its own `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolarSnapshot {
    pub date: NaiveDate,
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

impl SolarSnapshot {
    /// Build a snapshot, dropping seconds and sub-seconds
    pub fn new(date: NaiveDate, sunrise: NaiveTime, sunset: NaiveTime) -> Self {
        Self {
            date,
            sunrise: truncate_to_minute(sunrise),
            sunset: truncate_to_minute(sunset),
        }
    }

    pub fn anchor_time(&self, anchor: SolarAnchor) -> NaiveTime {
        match anchor {
            SolarAnchor::Sunrise => self.sunrise,
            SolarAnchor::Sunset => self.sunset,
        }
    }

    /// Sunrise as "HH:MM"
    pub fn sunrise_hhmm(&self) -> String {
        self.sunrise.format("%H:%M").to_string()
    }

    /// Sunset as "HH:MM"
    pub fn sunset_hhmm(&self) -> String {
        self.sunset.format("%H:%M").to_string()
    }
}

pub(crate) fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
