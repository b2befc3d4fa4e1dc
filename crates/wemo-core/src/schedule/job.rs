//! Jobs, triggers and the per-tick firing decision

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SolarSnapshot;
use crate::traits::DeviceHandle;
use crate::{Error, Result};

/// What a job does to its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    On,
    Off,
    Toggle,
}

impl Action {
    /// Run this action against a device
    pub async fn apply(self, device: &dyn DeviceHandle) -> Result<()> {
        match self {
            Action::On => device.on().await,
            Action::Off => device.off().await,
            Action::Toggle => device.toggle().await.map(|_| ()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "ON",
            Action::Off => "OFF",
            Action::Toggle => "TOGGLE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    /// Accepts "ON"/"OFF"/"TOGGLE" in any case, plus "Turn ON"/"Turn OFF"
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let word = normalized
            .strip_prefix("turn ")
            .unwrap_or(normalized.as_str())
            .trim();
        match word {
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            "toggle" => Ok(Action::Toggle),
            _ => Err(Error::invalid_input(format!("unknown action: {:?}", s))),
        }
    }
}

impl TryFrom<String> for Action {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

/// Solar event a relative trigger is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolarAnchor {
    Sunrise,
    Sunset,
}

/// When a job becomes eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A fixed local wall-clock minute
    Fixed(NaiveTime),
    /// Sunrise or sunset shifted by a signed number of minutes
    Solar {
        anchor: SolarAnchor,
        offset_minutes: i64,
    },
}

impl Trigger {
    pub fn needs_solar(&self) -> bool {
        matches!(self, Trigger::Solar { .. })
    }

    /// Resolve the trigger minute for today
    ///
    /// Solar offsets wrap across midnight (sunset 23:50 + 20 gives 00:10).
    ///
    /// # Returns
    ///
    /// `None` for a solar trigger when no snapshot is available, or when the
    /// offset is too large to represent
    pub fn resolve(&self, solar: Option<&SolarSnapshot>) -> Option<NaiveTime> {
        match *self {
            Trigger::Fixed(time) => Some(time),
            Trigger::Solar {
                anchor,
                offset_minutes,
            } => {
                let base = solar?.anchor_time(anchor);
                let (time, _) = base.overflowing_add_signed(Duration::try_minutes(offset_minutes)?);
                Some(time)
            }
        }
    }
}

/// Outcome of evaluating one job at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Today is not one of the job's weekdays
    WrongDay,
    /// Solar-anchored job and no solar times are known
    SolarUnavailable,
    /// The trigger minute is not now
    NotDue { trigger: NaiveTime },
    /// Due now, but already fired today
    AlreadyFired { trigger: NaiveTime },
    /// Fire now
    Due { trigger: NaiveTime },
}

/// One scheduled action against one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Stable identifier, used to write back `last_fired_date`
    pub id: String,
    /// Device name, resolved when the job fires
    pub device: String,
    pub action: Action,
    pub trigger: Trigger,
    /// Weekdays the job may fire on; empty means never
    pub days: Vec<Weekday>,
    /// Date of the last successful fire
    pub last_fired_date: Option<NaiveDate>,
}

impl Job {
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        self.days.contains(&weekday)
    }

    /// Decide whether this job fires at `now`
    ///
    /// # Parameters
    ///
    /// - `now`: Current local wall-clock time
    /// - `last_fired`: Effective last fire date (stored value or the engine's overlay)
    /// - `solar`: Today's solar snapshot, if known
    pub fn evaluate(
        &self,
        now: NaiveDateTime,
        last_fired: Option<NaiveDate>,
        solar: Option<&SolarSnapshot>,
    ) -> Evaluation {
        if !self.runs_on(now.weekday()) {
            return Evaluation::WrongDay;
        }

        let Some(trigger) = self.trigger.resolve(solar) else {
            return Evaluation::SolarUnavailable;
        };

        if !same_minute(trigger, now.time()) {
            return Evaluation::NotDue { trigger };
        }

        if last_fired == Some(now.date()) {
            return Evaluation::AlreadyFired { trigger };
        }

        Evaluation::Due { trigger }
    }
}

/// Exact "HH:MM" match
fn same_minute(a: NaiveTime, b: NaiveTime) -> bool {
    a.hour() == b.hour() && a.minute() == b.minute()
}

/// Weekday from its 0-based number, Monday = 0
pub(crate) fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}
