use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{NodepilotError, Result};

/// Unique identifier for a managed machine (UUIDv7, time-sortable, so
/// listing by id follows creation order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl MachineId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which control endpoint an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Start,
    Stop,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Start, Direction::Stop];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Start => write!(f, "start"),
            Direction::Stop => write!(f, "stop"),
        }
    }
}

/// Firing policy of a [`Schedule`].
///
/// Values other than `daily` and `range` are kept verbatim so a record written
/// by a newer client round-trips, but they never fire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScheduleKind {
    /// Every day at `time`.
    #[default]
    Daily,
    /// At `time` on every date in `[from_date, to_date]`.
    Range,
    Unknown(String),
}

impl From<String> for ScheduleKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "daily" => ScheduleKind::Daily,
            "range" => ScheduleKind::Range,
            _ => ScheduleKind::Unknown(s),
        }
    }
}

impl From<ScheduleKind> for String {
    fn from(kind: ScheduleKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleKind::Daily => write!(f, "daily"),
            ScheduleKind::Range => write!(f, "range"),
            ScheduleKind::Unknown(other) => write!(f, "{other}"),
        }
    }
}

/// A start or stop schedule embedded in a [`Machine`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub kind: ScheduleKind,
    /// Wall-clock `HH:MM`, 24-hour.
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "flexible_date::deserialize")]
    pub from_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "flexible_date::deserialize")]
    pub to_date: Option<NaiveDate>,
}

impl Schedule {
    pub fn daily(time: &str) -> Self {
        Self {
            enabled: true,
            kind: ScheduleKind::Daily,
            time: time.to_string(),
            from_date: None,
            to_date: None,
        }
    }

    pub fn range(time: &str, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            enabled: true,
            kind: ScheduleKind::Range,
            time: time.to_string(),
            from_date: Some(from),
            to_date: Some(to),
        }
    }

    /// `time` as a minute-resolution time of day, or `None` unless it is
    /// exactly zero-padded `HH:MM`.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        let time = self.time.trim();
        let bytes = time.as_bytes();
        let padded = bytes.len() == 5
            && bytes[2] == b':'
            && [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
        if !padded {
            return None;
        }
        NaiveTime::parse_from_str(time, "%H:%M").ok()
    }

    /// Reject enabled schedules that could never be evaluated meaningfully.
    /// Disabled schedules are accepted as-is.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.time_of_day().is_none() {
            return Err(NodepilotError::InvalidSchedule(format!(
                "time must be HH:MM, got {:?}",
                self.time
            )));
        }
        match &self.kind {
            ScheduleKind::Daily => Ok(()),
            ScheduleKind::Range => match (self.from_date, self.to_date) {
                (Some(from), Some(to)) if from <= to => Ok(()),
                (Some(from), Some(to)) => Err(NodepilotError::InvalidSchedule(format!(
                    "fromDate {from} is after toDate {to}"
                ))),
                _ => Err(NodepilotError::InvalidSchedule(
                    "range schedule requires fromDate and toDate".to_string(),
                )),
            },
            ScheduleKind::Unknown(other) => Err(NodepilotError::InvalidSchedule(format!(
                "unknown schedule type: {other}"
            ))),
        }
    }
}

/// Editable identity and endpoints of a machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDetails {
    pub name: String,
    pub node_id: String,
    pub start_url: String,
    pub stop_url: String,
}

impl MachineDetails {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("name", &self.name),
            ("nodeId", &self.node_id),
            ("startUrl", &self.start_url),
            ("stopUrl", &self.stop_url),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(NodepilotError::InvalidMachine(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// A managed compute node with its control endpoints and schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    /// Key into the node-status cache.
    pub node_id: String,
    pub start_url: String,
    pub stop_url: String,
    pub start_schedule: Schedule,
    pub stop_schedule: Schedule,
    /// Last-known status label; `"unknown"` until something records one.
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

impl Machine {
    pub fn endpoint(&self, direction: Direction) -> &str {
        match direction {
            Direction::Start => &self.start_url,
            Direction::Stop => &self.stop_url,
        }
    }

    pub fn schedule(&self, direction: Direction) -> &Schedule {
        match direction {
            Direction::Start => &self.start_schedule,
            Direction::Stop => &self.stop_schedule,
        }
    }

    pub fn has_enabled_schedule(&self) -> bool {
        self.start_schedule.enabled || self.stop_schedule.enabled
    }
}

/// Parse a calendar date given either as `YYYY-MM-DD` or as a full RFC 3339
/// timestamp. Timestamps are reduced to their UTC date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

/// Accepts `null`, `""`, a bare date or an RFC 3339 timestamp.
mod flexible_date {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_date(s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {s}"))),
        }
    }
}
