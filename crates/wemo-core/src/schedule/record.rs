// # Schedule Record Wire Format
//
// One entry of `schedules.json`:
//
// ```json
// {
//   "id": "porch-evening",
//   "device": "Porch Light",
//   "action": "ON",
//   "trigger_type": "sunset",
//   "trigger_value": 15,
//   "offset_direction": -1,
//   "days": [0, 1, 2, 3, 4],
//   "last_fired_date": "2025-03-10"
// }
// ```
//
// Files written by older desktop builds use `type`, `value`, `offset_dir`
// and `last_run`, spell actions as "Turn ON"/"Turn OFF"/"Toggle" and
// trigger types as "Time (Fixed)"/"Sunrise"/"Sunset". Those records have no
// `id`; one is derived from the record's content.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::weekday_from_index;
use super::{Action, Job, SolarAnchor, Trigger};
use crate::{Error, Result};

/// Trigger type field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TriggerKind {
    Fixed,
    Sunrise,
    Sunset,
}

impl TryFrom<String> for TriggerKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" | "time" | "time (fixed)" => Ok(TriggerKind::Fixed),
            "sunrise" => Ok(TriggerKind::Sunrise),
            "sunset" => Ok(TriggerKind::Sunset),
            _ => Err(Error::invalid_input(format!(
                "unknown trigger type: {:?}",
                value
            ))),
        }
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Fixed => "fixed",
            TriggerKind::Sunrise => "sunrise",
            TriggerKind::Sunset => "sunset",
        }
        .to_string()
    }
}

/// Trigger value field: "HH:MM" or a minute count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerValue {
    Minutes(i64),
    Text(String),
}

impl TriggerValue {
    fn as_minutes(&self) -> Result<i64> {
        match self {
            TriggerValue::Minutes(minutes) => Ok(*minutes),
            TriggerValue::Text(text) => text.trim().parse().map_err(|_| {
                Error::invalid_input(format!("offset is not a whole number: {:?}", text))
            }),
        }
    }

    fn as_time(&self) -> Result<NaiveTime> {
        match self {
            TriggerValue::Text(text) => NaiveTime::parse_from_str(text.trim(), "%H:%M")
                .map_err(|e| Error::invalid_input(format!("invalid time {:?}: {}", text, e))),
            TriggerValue::Minutes(minutes) => Err(Error::invalid_input(format!(
                "fixed trigger needs \"HH:MM\", got {}",
                minutes
            ))),
        }
    }
}

impl fmt::Display for TriggerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerValue::Minutes(minutes) => write!(f, "{}", minutes),
            TriggerValue::Text(text) => f.write_str(text.trim()),
        }
    }
}

/// Which side of the solar anchor an offset applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDirection", into = "i64")]
pub enum OffsetDirection {
    Before,
    #[default]
    After,
}

impl OffsetDirection {
    pub fn sign(self) -> i64 {
        match self {
            OffsetDirection::Before => -1,
            OffsetDirection::After => 1,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDirection {
    Number(i64),
    Word(String),
}

impl TryFrom<RawDirection> for OffsetDirection {
    type Error = Error;

    fn try_from(raw: RawDirection) -> Result<Self> {
        match raw {
            RawDirection::Number(n) if n < 0 => Ok(OffsetDirection::Before),
            RawDirection::Number(n) if n > 0 => Ok(OffsetDirection::After),
            RawDirection::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "before" | "-" | "-1" => Ok(OffsetDirection::Before),
                "after" | "+" | "1" | "+1" => Ok(OffsetDirection::After),
                _ => Err(Error::invalid_input(format!(
                    "unknown offset direction: {:?}",
                    word
                ))),
            },
            RawDirection::Number(_) => Err(Error::invalid_input("offset direction cannot be 0")),
        }
    }
}

impl From<OffsetDirection> for i64 {
    fn from(direction: OffsetDirection) -> Self {
        direction.sign()
    }
}

/// Largest solar offset accepted, one full day
pub const MAX_OFFSET_MINUTES: i64 = 24 * 60;

/// On-disk schedule entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub device: String,
    pub action: Action,
    #[serde(alias = "type")]
    pub trigger_type: TriggerKind,
    #[serde(alias = "value")]
    pub trigger_value: TriggerValue,
    #[serde(default, alias = "offset_dir")]
    pub offset_direction: OffsetDirection,
    #[serde(default)]
    pub days: Vec<u8>,
    #[serde(default, alias = "last_run")]
    pub last_fired_date: Option<NaiveDate>,
}

impl JobRecord {
    /// The record's id, or one derived from its content when absent
    ///
    /// The derived id covers every field except `last_fired_date`, so it
    /// stays stable when the scheduler writes the fire date back.
    pub fn effective_id(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => {
                let days: Vec<String> = self.days.iter().map(u8::to_string).collect();
                format!(
                    "{}|{}|{}|{}|{}|{}",
                    self.device,
                    self.action,
                    String::from(self.trigger_type),
                    self.trigger_value,
                    self.offset_direction.sign(),
                    days.join(",")
                )
            }
        }
    }

    fn trigger(&self) -> Result<Trigger> {
        let anchor = match self.trigger_type {
            TriggerKind::Fixed => return Ok(Trigger::Fixed(self.trigger_value.as_time()?)),
            TriggerKind::Sunrise => SolarAnchor::Sunrise,
            TriggerKind::Sunset => SolarAnchor::Sunset,
        };

        let minutes = self.trigger_value.as_minutes()?;
        if !(0..=MAX_OFFSET_MINUTES).contains(&minutes) {
            return Err(Error::invalid_input(format!(
                "offset minutes must be between 0 and {}, got {}",
                MAX_OFFSET_MINUTES, minutes
            )));
        }

        Ok(Trigger::Solar {
            anchor,
            offset_minutes: minutes * self.offset_direction.sign(),
        })
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = Error;

    fn try_from(record: JobRecord) -> Result<Self> {
        if record.device.trim().is_empty() {
            return Err(Error::invalid_input("job has no device"));
        }

        let trigger = record.trigger()?;

        let mut days = Vec::with_capacity(record.days.len());
        for index in &record.days {
            let day = weekday_from_index(*index)
                .ok_or_else(|| Error::invalid_input(format!("invalid weekday number: {}", index)))?;
            if !days.contains(&day) {
                days.push(day);
            }
        }

        Ok(Job {
            id: record.effective_id(),
            device: record.device,
            action: record.action,
            trigger,
            days,
            last_fired_date: record.last_fired_date,
        })
    }
}
