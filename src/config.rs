//! Engine configuration and resource limits
//!
//! Every limit guards the engine against untrusted input: a batch too large,
//! a table grown without bound, or a SELECT that would materialize the
//! whole store.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest batch text accepted, in bytes
    pub max_input_bytes: usize,

    /// Most statements one batch may contain
    pub max_statements_per_batch: usize,

    /// Rows a single table may hold; INSERTs past it fail
    pub max_rows_per_table: usize,

    /// Rows a single SELECT may return
    pub max_result_rows: usize,

    /// Execution records kept per owner scope (oldest evicted)
    pub history_capacity: usize,

    /// Compiled LIKE patterns kept in the LRU cache
    pub like_cache_size: usize,

    /// Directory of the JSON file backing store.
    ///
    /// `None` keeps everything in process memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 64 * 1024, // 64KB
            max_statements_per_batch: 100,
            max_rows_per_table: 10_000,
            max_result_rows: 1_000,
            history_capacity: 500,
            like_cache_size: 256,
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Limits for the public browser sandbox
    pub fn for_sandbox() -> Self {
        Self {
            max_input_bytes: 16 * 1024,
            max_statements_per_batch: 25,
            max_rows_per_table: 1_000,
            max_result_rows: 500,
            history_capacity: 100,
            ..Default::default()
        }
    }

    /// Small limits so tests can hit them cheaply
    pub fn for_testing() -> Self {
        Self {
            max_input_bytes: 4 * 1024,
            max_statements_per_batch: 20,
            max_rows_per_table: 100,
            max_result_rows: 50,
            history_capacity: 10,
            like_cache_size: 8,
            data_dir: None,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("max_input_bytes", self.max_input_bytes),
            ("max_statements_per_batch", self.max_statements_per_batch),
            ("max_rows_per_table", self.max_rows_per_table),
            ("max_result_rows", self.max_result_rows),
            ("history_capacity", self.history_capacity),
            ("like_cache_size", self.like_cache_size),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(EngineError::Config(format!("{} must be greater than 0", name)));
        }
        if matches!(&self.data_dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(EngineError::Config("data_dir must not be empty".into()));
        }
        Ok(())
    }
}
