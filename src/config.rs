//! Session configuration
//!
//! Controls whether directly reachable sub-units are traced and which
//! foundational units must never be treated as traceable sub-units.
//!
//! # Example TOML
//! ```toml
//! trace_submodules = true
//! denylist = ["std", "core", "sys"]
//! ```

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Foundational units that are never discovered as sub-units
pub const DEFAULT_DENYLIST: &[&str] = &[
    "alloc",
    "builtins",
    "core",
    "io",
    "os",
    "proc_macro",
    "std",
    "sys",
    "test",
    "time",
    "warnings",
];

/// Configuration for one tracing session
///
/// # Example
/// ```
/// use modtrace::config::SessionConfig;
///
/// let config = SessionConfig::default();
/// assert!(!config.trace_submodules);
/// assert!(config.is_denied("std"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Also patch sub-units directly reachable from the traced unit
    pub trace_submodules: bool,

    /// Unit names excluded from sub-unit discovery
    ///
    /// Matched against the member name a sub-unit is bound to and its
    /// qualified name. The first dotted segment of the qualified name also
    /// matches unless it is the traced unit's own top-level segment.
    pub denylist: BTreeSet<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trace_submodules: false,
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a TOML file
    ///
    /// # Errors
    /// Returns `TraceError::Io` if the file cannot be read and
    /// `TraceError::Config` if it is not a valid configuration.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text; omitted keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TraceError::Config(e.to_string()))
    }

    pub fn with_submodules(mut self, enabled: bool) -> Self {
        self.trace_submodules = enabled;
        self
    }

    /// Add a name to the denylist
    pub fn with_denied(mut self, name: impl Into<String>) -> Self {
        self.denylist.insert(name.into());
        self
    }

    /// Remove a name from the denylist
    pub fn with_allowed(mut self, name: &str) -> Self {
        self.denylist.remove(name);
        self
    }

    /// True if `name` (or its top-level segment) is denylisted
    pub fn is_denied(&self, name: &str) -> bool {
        if self.denylist.contains(name) {
            return true;
        }
        match name.split_once('.') {
            Some((head, _)) => self.denylist.contains(head),
            None => false,
        }
    }

    /// True if a sub-unit of `parent`, bound as `member` and qualified as
    /// `qualified`, must be skipped
    ///
    /// The member name and the exact qualified name always count. The first
    /// dotted segment only counts when it is not `parent`'s own top-level
    /// segment, so a root named like a foundational unit keeps its children.
    pub fn is_denied_subunit(&self, parent: &str, member: &str, qualified: &str) -> bool {
        if self.denylist.contains(member) || self.denylist.contains(qualified) {
            return true;
        }
        let parent_head = parent.split('.').next().unwrap_or(parent);
        match qualified.split_once('.') {
            Some((head, _)) if head != parent_head => self.denylist.contains(head),
            _ => false,
        }
    }
}
