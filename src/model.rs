use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Date format used for persisted events and exported schedules.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub summary: String,
    pub uid: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(alias = "Cleaning: Checkin Same Day")]
    CheckinSameDay,
    #[serde(alias = "Cleaning: Checkin Not Same Day")]
    CheckinNotSameDay,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CheckinSameDay => "CheckinSameDay",
            TaskType::CheckinNotSameDay => "CheckinNotSameDay",
        }
    }

    /// Human readable label used in messages and exports.
    pub fn label(&self) -> &'static str {
        match self {
            TaskType::CheckinSameDay => "Cleaning: Checkin Same Day",
            TaskType::CheckinNotSameDay => "Cleaning: Checkin Not Same Day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningTask {
    pub id: String,
    pub date: NaiveDate,
    pub property: String,
    pub task_type: TaskType,
    pub assigned_cleaner: Option<String>,
}

impl CleaningTask {
    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            date: self.date,
            task_type: self.task_type,
            assigned_cleaner: self.assigned_cleaner.clone(),
        }
    }
}

/// Persisted projection of a [`CleaningTask`]; the task id is the map key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    #[serde(with = "dmy_date")]
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub assigned_cleaner: Option<String>,
}

pub type EventMap = BTreeMap<String, EventRecord>;

/// Key events by task id.
pub fn events_from_tasks(tasks: &[CleaningTask]) -> EventMap {
    tasks
        .iter()
        .map(|t| (t.id.clone(), t.to_record()))
        .collect()
}

/// Per-property document loaded before and saved after every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyState {
    #[serde(default)]
    pub events: EventMap,
    #[serde(rename = "last_full_message", default)]
    pub last_full_message_sent_at: Option<DateTime<Utc>>,
}

pub(crate) mod dmy_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(D::Error::custom)
    }
}
