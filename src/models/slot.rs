use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ClientError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if start >= end {
            return Err(ClientError::InvalidTimeRange(format!(
                "{} must be before {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse_parts(start: &str, end: &str) -> Result<Self, ClientError> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn start_hhmm(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn end_hhmm(&self) -> String {
        self.end.format("%H:%M").to_string()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_hhmm(), self.end_hhmm())
    }
}

impl FromStr for TimeRange {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ClientError::InvalidTimeRange(format!("expected HH:MM - HH:MM, got {s:?}")))?;
        Self::parse_parts(start.trim(), end.trim())
    }
}

impl Serialize for TimeRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

// The backend sends HH:MM:SS, users type HH:MM.
fn parse_clock(s: &str) -> Result<NaiveTime, ClientError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ClientError::InvalidTimeRange(format!("invalid time: {s:?}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub facility_id: i64,
    pub date: NaiveDate,
    pub range: TimeRange,
}

impl SlotKey {
    pub fn new(facility_id: i64, date: NaiveDate, range: TimeRange) -> Self {
        Self {
            facility_id,
            date,
            range,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "facility {} on {} at {}",
            self.facility_id,
            self.date.format("%Y-%m-%d"),
            self.range
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub facility_id: i64,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub locked_by_other: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: Vec<TimeSlot>,
    pub locked_by_other: Vec<TimeSlot>,
}

impl Availability {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains_available(&self, range: &TimeRange) -> bool {
        self.available.iter().any(|s| s.range == *range)
    }

    // A slot locked by someone else is never selectable, even if it shows
    // up in both lists.
    pub fn is_selectable(&self, range: &TimeRange) -> bool {
        self.contains_available(range) && !self.locked_by_other.iter().any(|s| s.range == *range)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty() && self.locked_by_other.is_empty()
    }
}
