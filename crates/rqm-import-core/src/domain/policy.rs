//! Import policy flags.

use serde::{Deserialize, Serialize};

/// Flags controlling what the engine may change on the remote side.
///
/// Fixed for the whole invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Create test cases for tests that carry no test-case id.
    pub create_missing: bool,
    /// Overwrite referenced test cases with the rendered log data.
    pub update_existing: bool,
    /// Query only; report what would change without changing it.
    pub dry_run: bool,
    /// Descend into subdirectories when looking for result files.
    pub recursive: bool,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_missing(mut self, enabled: bool) -> Self {
        self.create_missing = enabled;
        self
    }

    pub fn update_existing(mut self, enabled: bool) -> Self {
        self.update_existing = enabled;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.recursive = enabled;
        self
    }
}
