use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A medication with its reminder schedule, as stored on the backend.
///
/// `id` and `created_at` are assigned by the backend on insert.
/// `notification_ids` holds the identifiers of every pending reminder alert
/// for this row; the set is replaced wholesale whenever the schedule is
/// re-expanded (edit) and drained on delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reminder_times: Vec<ReminderTime>,
    #[serde(default)]
    pub notification_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Form payload for creating or editing a medication.
///
/// Reminder times arrive as raw "HH:MM" strings from the host UI and are
/// parsed (and rejected when malformed) before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationInput {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reminder_times: Vec<String>,
}

impl MedicationInput {
    /// Parse the raw time strings into an ordered, de-duplicated set.
    pub fn parsed_times(&self) -> Result<Vec<ReminderTime>, InvalidReminderTime> {
        let mut times = self
            .reminder_times
            .iter()
            .map(|raw| raw.parse::<ReminderTime>())
            .collect::<Result<Vec<_>, _>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }
}

// ═══════════════════════════════════════════════════════════
// ReminderTime
// ═══════════════════════════════════════════════════════════

/// A wall-clock reminder time of day, parsed from a strict "HH:MM" string.
/// Seconds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    /// Build from an hour (0-23) and minute (0-59). None when out of range.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn as_time(self) -> NaiveTime {
        self.0
    }

    /// The fire-instant for this time on the given calendar day.
    pub fn on(self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.0)
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Rejection of a malformed reminder time string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid reminder time {value:?}: expected \"HH:MM\" with hour 0-23 and minute 0-59")]
pub struct InvalidReminderTime {
    pub value: String,
}

impl FromStr for ReminderTime {
    type Err = InvalidReminderTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reject = || InvalidReminderTime { value: s.to_string() };
        let (hour, minute) = s.split_once(':').ok_or_else(reject)?;
        if hour.is_empty() || minute.is_empty() || minute.contains(':') {
            return Err(reject());
        }
        let hour: u32 = hour.parse().map_err(|_| reject())?;
        let minute: u32 = minute.parse().map_err(|_| reject())?;
        ReminderTime::new(hour, minute).ok_or_else(reject)
    }
}

impl Serialize for ReminderTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One element of the (day × time) cross product during scheduling.
/// Ephemeral: never persisted as its own entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub fire_instant: NaiveDateTime,
    pub notification_id: Uuid,
}
