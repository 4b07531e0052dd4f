//! Error types for the declarative crate

use thiserror::Error;

/// Errors raised while building resource metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Tag does not match the allowed tag syntax
    #[error("invalid tag: {0:?}")]
    InvalidTag(String),

    /// Schedule definition cannot be interpreted
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
