//! # Declarative
//!
//! The resource model consumed by a desired-state convergence engine.
//!
//! ## Core Concepts
//!
//! - **Resource**: a declared system object with desired property values
//! - **Provider**: the backend shared by resources of one type; may prefetch
//! - **Change**: one out-of-sync property, current value → desired value
//! - **Event**: the outcome of applying a change, or a synthetic
//!   restart/noop marker
//! - **TagSet / TagList**: resource tags and the tag filter selecting them
//! - **Schedule**: maintenance window restricting when a resource applies
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{compute_changes, Resource};
//!
//! fn converge(resource: &dyn Resource, noop: bool) -> anyhow::Result<()> {
//!     for mut change in compute_changes(resource)? {
//!         let event = change.apply(resource, noop);
//!         println!("{}: {}", event.source, event.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod change;
pub mod diff;
pub mod error;
pub mod event;
pub mod provider;
pub mod resource;
pub mod schedule;
pub mod tags;
pub mod types;

// Re-export main types at crate root
pub use change::Change;
pub use diff::{ENSURE, compute_changes};
pub use error::{Error, Result};
pub use event::{Event, NOOP_RESTART, RESTARTED};
pub use provider::Provider;
pub use resource::{BoxedResource, Resource, ResourceExt};
pub use schedule::{Schedule, TimeRange};
pub use tags::{TagList, TagSet, valid_tag};
pub use types::{EventStatus, ResourceRef, Value};
