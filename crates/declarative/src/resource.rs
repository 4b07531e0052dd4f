//! Resource trait for declarative state management
//!
//! A Resource is a declared system object (a file, a package, a service)
//! with desired property values. The engine asks it for its current state,
//! diffs that against the declared state and syncs each out-of-sync
//! property, one [`Change`](crate::Change) at a time.

use crate::provider::Provider;
use crate::schedule::Schedule;
use crate::tags::TagSet;
use crate::types::{ResourceRef, Value};
use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Core trait for declarative resources
///
/// Only identity, tags, state retrieval and `sync` are required; every
/// capability flag defaults to "off".
///
/// # Example
///
/// ```ignore
/// use declarative::{Resource, ResourceRef, TagSet, Value};
///
/// #[derive(Debug)]
/// struct Motd { text: String, tags: TagSet }
///
/// impl Resource for Motd {
///     fn reference(&self) -> ResourceRef { ResourceRef::new("file", "/etc/motd") }
///     fn tags(&self) -> &TagSet { &self.tags }
///     fn tags_mut(&mut self) -> &mut TagSet { &mut self.tags }
///
///     fn retrieve(&self) -> anyhow::Result<Vec<(String, Value)>> {
///         let text = std::fs::read_to_string("/etc/motd").unwrap_or_default();
///         Ok(vec![("content".into(), Value::from(text))])
///     }
///
///     fn desired(&self) -> Vec<(String, Value)> {
///         vec![("content".into(), Value::from(self.text.as_str()))]
///     }
///
///     fn sync(&self, _property: &str, should: &Value) -> anyhow::Result<()> {
///         std::fs::write("/etc/motd", should.to_string())?;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Type and title; unique within a catalog
    fn reference(&self) -> ResourceRef;

    /// Underlying system name, which may differ from the title
    ///
    /// Two resources of the same type with the same name describe the same
    /// system object.
    fn name(&self) -> String {
        self.reference().title
    }

    fn tags(&self) -> &TagSet;

    fn tags_mut(&mut self) -> &mut TagSet;

    /// Exported resources are declared for collection elsewhere
    fn is_exported(&self) -> bool {
        false
    }

    /// Virtual resources are declarative only and never applied
    fn is_virtual(&self) -> bool {
        self.is_exported()
    }

    /// Whether the resource reacts (via `refresh`) to its own change events
    fn self_refresh(&self) -> bool {
        false
    }

    /// Whether the resource is being removed in this run
    fn deleting(&self) -> bool {
        false
    }

    /// Whether the resource was generated to purge unmanaged system objects
    fn purging(&self) -> bool {
        false
    }

    /// Per-resource noop mode
    fn noop(&self) -> bool {
        false
    }

    /// Whether generated children are applied before this resource
    fn depth_first(&self) -> bool {
        false
    }

    fn schedule(&self) -> Option<&Schedule> {
        None
    }

    fn provider(&self) -> Option<Arc<dyn Provider>> {
        None
    }

    /// Observed values of the managed properties
    ///
    /// Properties missing from the result are treated as absent.
    fn retrieve(&self) -> Result<Vec<(String, Value)>>;

    /// Declared values, in declaration order
    fn desired(&self) -> Vec<(String, Value)>;

    /// Whether the observed value already satisfies the declared one
    fn insync(&self, _property: &str, is: &Value, should: &Value) -> bool {
        is == should
    }

    /// Name of the event emitted when `property` is synced to `should`
    fn event_name(&self, _property: &str, _should: &Value) -> String {
        format!("{}_changed", self.reference().type_name.replace("::", "_"))
    }

    /// Write one property to the system
    fn sync(&self, property: &str, should: &Value) -> Result<()>;

    /// Called once after at least one property was synced
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Reaction names this resource can be triggered with
    fn callbacks(&self) -> &[&'static str] {
        &[]
    }

    /// Capability query for a reaction; unsupported names are simply `false`
    fn supports(&self, callback: &str) -> bool {
        self.callbacks().iter().any(|c| *c == callback)
    }

    /// Run a named reaction (e.g. `refresh` restarts a service)
    fn invoke(&self, callback: &str) -> Result<()> {
        bail!("{} does not support '{callback}'", self.reference())
    }

    /// Resources to add to the catalog before ordering
    fn generate(&self) -> Result<Vec<BoxedResource>> {
        Ok(Vec::new())
    }

    /// Resources to add and apply when this resource's turn comes
    fn eval_generate(&self) -> Result<Vec<BoxedResource>> {
        Ok(Vec::new())
    }

    /// Post-construction validation, run when a generated resource is inserted
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// Extension trait with derived queries
pub trait ResourceExt {
    /// Whether the resource's schedule (if any) admits `now`
    fn scheduled_at(&self, now: NaiveDateTime) -> bool;

    /// Whether any of `tags` is carried by the resource
    fn tagged<S: AsRef<str>>(&self, tags: &[S]) -> bool;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn scheduled_at(&self, now: NaiveDateTime) -> bool {
        self.schedule().is_none_or(|s| s.matches(now))
    }

    fn tagged<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        self.tags().tagged_with_any(tags)
    }
}
