//! In-memory report of one transaction: metrics, events and log entries

use chrono::{DateTime, Utc};
use declarative::Event;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a report log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Err,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Err => "err",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Reference of the resource the message is about, or "steward"
    pub source: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// One metric value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub name: String,
    pub label: String,
    pub value: f64,
}

/// A named group of values, e.g. `resources` → {total, applied, ...}
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub label: String,
    pub values: Vec<MetricValue>,
}

impl Metric {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: labelize(name),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str, value: f64) {
        self.values.push(MetricValue {
            name: name.to_string(),
            label: labelize(name),
            value,
        });
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|v| v.name == name).map(|v| v.value)
    }
}

/// `failed_restarts` → `Failed restarts`
fn labelize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub host: String,
    /// Set when metrics are added at the end of a run
    pub time: Option<DateTime<Utc>>,
    metrics: BTreeMap<String, Metric>,
    events: Vec<Event>,
    logs: Vec<LogEntry>,
}

impl Report {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn register_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Add (or replace) a metric group
    pub fn newmetric<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut metric = Metric::new(name);
        for (value_name, value) in values {
            metric.push(value_name.as_ref(), value);
        }
        self.metrics.insert(name.to_string(), metric);
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = Some(time);
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn log(&mut self, level: LogLevel, source: impl Into<String>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level,
            source: source.into(),
            message: message.into(),
            time: Utc::now(),
        });
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Log entries whose message contains `needle`
    pub fn logs_matching(&self, needle: &str) -> Vec<&LogEntry> {
        self.logs
            .iter()
            .filter(|l| l.message.contains(needle))
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
