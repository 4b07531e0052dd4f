//! Maintenance windows that restrict when a resource may be applied

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Time-of-day window; wraps past midnight when `end < start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    /// Parse `"HH:MM - HH:MM"` (seconds optional)
    pub fn parse(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidSchedule(format!("range {s:?} has no '-'")))?;
        Ok(Self {
            start: parse_time(start.trim())?,
            end: parse_time(end.trim())?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| Error::InvalidSchedule(format!("bad time {s:?}: {e}")))
}

/// A named schedule; an empty schedule always matches
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub range: Option<TimeRange>,
    /// Days the schedule is active; empty means every day
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
}

impl Schedule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: &str) -> Result<Self> {
        self.range = Some(TimeRange::parse(range)?);
        Ok(self)
    }

    pub fn with_weekdays(mut self, days: &[&str]) -> Result<Self> {
        self.weekdays = days
            .iter()
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| Error::InvalidSchedule(format!("unknown weekday {d:?}")))
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Whether `now` falls inside this schedule
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        if !self.weekdays.is_empty() && !self.weekdays.contains(&now.weekday()) {
            return false;
        }
        self.range.is_none_or(|r| r.contains(now.time()))
    }
}
