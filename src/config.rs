//! Transaction options
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! tags = "web, db"        # or ["web", "db"]
//! ignore_schedules = false
//! noop = true
//! evaltrace = false
//! jobs = 4
//! ```

use crate::error::{Error, Result};
use declarative::TagList;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Only apply resources carrying one of these tags; empty applies everything
    pub tags: TagList,
    /// Apply resources even outside their schedules
    pub ignore_schedules: bool,
    /// Compute changes but apply none of them
    pub noop: bool,
    /// Log how long each resource took to evaluate
    pub evaltrace: bool,
    /// Width of the prefetch thread pool
    pub jobs: usize,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            tags: TagList::default(),
            ignore_schedules: false,
            noop: false,
            evaltrace: false,
            jobs: 4,
        }
    }
}

impl TransactionOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options = Self::from_toml_str(&content)?;
        log::debug!("Loaded transaction options from {}", path.display());
        Ok(options)
    }

    pub fn with_tags(mut self, tags: impl Into<TagList>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    pub fn with_ignore_schedules(mut self, ignore: bool) -> Self {
        self.ignore_schedules = ignore;
        self
    }
}
