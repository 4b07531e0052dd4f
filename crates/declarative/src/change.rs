//! Pending property mutations

use crate::event::Event;
use crate::resource::Resource;
use crate::types::{EventStatus, ResourceRef, Value};
use serde::{Deserialize, Serialize};

/// A pending change of one property from its observed value to its desired value
///
/// Applying a change yields exactly one [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub resource: ResourceRef,
    pub property: String,
    pub is: Value,
    pub should: Value,
    /// Set once the change has been applied
    pub changed: bool,
}

impl Change {
    pub fn new(resource: ResourceRef, property: impl Into<String>, is: Value, should: Value) -> Self {
        Self {
            resource,
            property: property.into(),
            is,
            should,
            changed: false,
        }
    }

    /// Human description of the transition
    pub fn describe(&self) -> String {
        match (&self.is, &self.should) {
            (Value::Absent, _) if self.property == "ensure" => "created".to_string(),
            (_, Value::Absent) if self.property == "ensure" => "removed".to_string(),
            (is, should) => format!("{} changed '{is}' to '{should}'", self.property),
        }
    }

    /// Apply the change through the resource
    ///
    /// In noop mode nothing is written and a noop event is returned. A
    /// provider error becomes a failure event; it is never returned as `Err`.
    pub fn apply(&mut self, resource: &dyn Resource, noop: bool) -> Event {
        let name = resource.event_name(&self.property, &self.should);
        let event = Event::new(self.resource.clone(), name, EventStatus::Noop)
            .with_property(self.property.clone())
            .with_values(self.is.clone(), self.should.clone());

        if noop {
            return event.with_message(format!(
                "current value {}, should be {} (noop)",
                self.is, self.should
            ));
        }

        let event = match resource.sync(&self.property, &self.should) {
            Ok(()) => Event {
                status: EventStatus::Success,
                ..event
            }
            .with_message(self.describe()),
            Err(e) => Event {
                status: EventStatus::Failure,
                ..event
            }
            .with_message(format!(
                "change from {} to {} failed: {e:#}",
                self.is, self.should
            )),
        };
        self.changed = true;
        event
    }
}
