//! Provider trait
//!
//! A provider is the system-facing backend shared by every resource of one
//! type that uses it (e.g. the `systemd` provider for services). Resources
//! hold it behind an `Arc`, so prefetched state lives inside the provider.

use crate::types::ResourceRef;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;

pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider name, e.g. "systemd"
    fn name(&self) -> &str;

    /// Resource type this provider manages, e.g. "service"
    fn resource_type(&self) -> &str;

    /// Whether [`Provider::prefetch`] should be called before evaluation
    fn supports_prefetch(&self) -> bool {
        false
    }

    /// Load current state for many resources in one query
    ///
    /// Keys are the underlying system names, so several titles naming the
    /// same object appear once.
    fn prefetch(&self, _resources: &BTreeMap<String, ResourceRef>) -> Result<()> {
        Ok(())
    }
}
