//! Steward - transaction engine for declarative system configuration
//!
//! A [`Catalog`] holds resources and the relationships between them. A
//! [`Transaction`] converges every resource in dependency order, routes the
//! resulting events to subscribed resources through the [`EventManager`],
//! and records what happened in a [`Report`].
//!
//! Resource and provider contracts live in the [`declarative`] crate,
//! re-exported here.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod report;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use catalog::{Catalog, ResourceId};
pub use config::TransactionOptions;
pub use error::{Error, Result};
pub use graph::{Edge, EventTrigger, REFRESH, Relationship, RelationshipGraph};
pub use report::{LogEntry, LogLevel, Metric, Report};
pub use transaction::{
    EventManager, ResourceMetrics, TimeMetrics, Transaction, TransactionState,
};

pub use declarative;
