//! Error types for the transaction engine
//!
//! Only structural problems surface as errors: a cyclic or dangling
//! relationship graph stops a run before anything is applied, and catalog
//! insertion reports collisions. Failures while converging resources are
//! turned into events, log entries and metrics instead.

use declarative::ResourceRef;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The relationship graph contains a cycle
    #[error("found dependency cycle: {}", .cycle.join(" => "))]
    DependencyCycle {
        /// Resource references along the cycle, first element repeated at the end
        cycle: Vec<String>,
    },

    /// A relationship refers to a resource that is not in the catalog
    #[error("could not find resource {reference} for relationship {relationship}")]
    UnknownResource {
        reference: ResourceRef,
        relationship: String,
    },

    /// A resource with the same reference or the same type and name exists
    #[error("duplicate definition: {reference} is already defined as {existing}")]
    DuplicateResource {
        reference: ResourceRef,
        existing: ResourceRef,
    },

    /// Post-construction validation of a resource failed
    #[error("could not finish {reference}: {message}")]
    FinishFailed {
        reference: ResourceRef,
        message: String,
    },

    /// Invalid tag or schedule
    #[error(transparent)]
    Declarative(#[from] declarative::Error),

    /// Options file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Options file is not valid TOML for the expected schema
    #[error("invalid options: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
