//! Outcome records produced by applying changes

use crate::types::{EventStatus, ResourceRef, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event name used when a resource confirms a triggered callback
pub const RESTARTED: &str = "restarted";

/// Event name used when a callback would have fired outside noop mode
pub const NOOP_RESTART: &str = "noop_restart";

/// Immutable record of one outcome attached to the resource that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source: ResourceRef,
    /// Event name that relationship triggers match against (`file_changed`, `restarted`)
    pub name: String,
    pub property: Option<String>,
    pub status: EventStatus,
    pub message: String,
    pub previous_value: Option<Value>,
    pub desired_value: Option<Value>,
    pub time: DateTime<Utc>,
}

impl Event {
    pub fn new(source: ResourceRef, name: impl Into<String>, status: EventStatus) -> Self {
        Self {
            source,
            name: name.into(),
            property: None,
            status,
            message: String::new(),
            previous_value: None,
            desired_value: None,
            time: Utc::now(),
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_values(mut self, previous: Value, desired: Value) -> Self {
        self.previous_value = Some(previous);
        self.desired_value = Some(desired);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.status == EventStatus::Noop
    }

    pub fn is_failure(&self) -> bool {
        self.status == EventStatus::Failure
    }
}
