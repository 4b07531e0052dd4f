//! Per-transaction counters

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Resource counts for one transaction; only ever incremented
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceMetrics {
    /// Resources in the catalog, generated ones included
    pub total: usize,
    /// Resources that reached change computation
    pub scheduled: usize,
    /// Resources with at least one change
    pub out_of_sync: usize,
    /// Resources that had changes applied
    pub applied: usize,
    pub skipped: usize,
    /// Resources whose callbacks ran
    pub restarted: usize,
    /// Resources with at least one failure
    pub failed: usize,
    /// Callbacks that returned an error
    pub failed_restarts: usize,
}

impl ResourceMetrics {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Name/value pairs in report order
    pub fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total", self.total as f64),
            ("scheduled", self.scheduled as f64),
            ("out_of_sync", self.out_of_sync as f64),
            ("applied", self.applied as f64),
            ("skipped", self.skipped as f64),
            ("restarted", self.restarted as f64),
            ("failed", self.failed as f64),
            ("failed_restarts", self.failed_restarts as f64),
        ]
    }
}

/// Seconds spent applying each resource type
#[derive(Debug, Clone, Default)]
pub struct TimeMetrics {
    by_type: BTreeMap<String, f64>,
}

impl TimeMetrics {
    pub fn record(&mut self, type_name: &str, elapsed: Duration) {
        *self.by_type.entry(type_name.to_string()).or_default() += elapsed.as_secs_f64();
    }

    pub fn total(&self) -> f64 {
        self.by_type.values().sum()
    }

    /// Per-type values followed by `total`
    pub fn values(&self) -> Vec<(String, f64)> {
        self.by_type
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .chain(std::iter::once(("total".to_string(), self.total())))
            .collect()
    }
}
