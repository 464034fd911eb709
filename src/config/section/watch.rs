//! `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [watch]
//! stats = "dist/stats.json"   # Written by `webpack --watch --json=dist/stats.json`
//! debounce = 200              # Quiet period before a change is read (ms)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Compiler stats watching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Stats file, relative to the project root.
    pub stats: Option<PathBuf>,

    /// Debounce window in milliseconds.
    pub debounce: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stats: None,
            debounce: 200,
        }
    }
}

impl WatchConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.stats.as_ref().is_some_and(|path| path.is_dir()) {
            diag.error(FieldPath::new("watch.stats"), "must be a file, not a directory");
        }
    }
}
