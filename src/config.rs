//! Run parameters shared by every worker.
//!
//! A [`RunConfig`] can be built in code, or read from a TOML file:
//!
//! ```toml
//! rows = 1000
//! cols = 500
//! root = 0
//! seed = 42
//!
//! [kernel]
//! strategy = "threaded"
//! threads = 4
//! ```

use crate::comm::check_root;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use serde::Deserialize;
use std::path::Path;

/// Default row count (M).
pub const DEFAULT_ROWS: usize = 8;
/// Default column count (N).
pub const DEFAULT_COLS: usize = 4;

/// Parameters of one distributed multiplication.
///
/// Every worker must use an identical configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Matrix rows (M) and result length
    pub rows: usize,
    /// Matrix columns (N) and vector length
    pub cols: usize,
    /// Coordinator rank
    pub root: i32,
    /// Local kernel strategy
    pub kernel: Kernel,
    /// Seed for the random inputs; `None` picks one from the clock
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            root: 0,
            kernel: Kernel::Sequential,
            seed: None,
        }
    }
}

impl RunConfig {
    /// An `rows × cols` run with default root and kernel.
    pub fn new(rows: usize, cols: usize) -> Self {
        RunConfig {
            rows,
            cols,
            ..Self::default()
        }
    }

    /// Set the coordinator rank.
    pub fn with_root(mut self, root: i32) -> Self {
        self.root = root;
        self
    }

    /// Set the kernel strategy.
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Check the configuration against the size of the group running it.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `workers <= 0`, [`Error::InvalidRank`] if
    /// the root is not a member of the group.
    pub fn validate(&self, workers: i32) -> Result<()> {
        if workers <= 0 {
            return Err(Error::Configuration(format!(
                "worker count must be at least 1, got {workers}"
            )));
        }
        check_root(self.root, workers)
    }

    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(format!("invalid config: {e}")))
    }

    /// Read a configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}
