//! Scan configuration.
//!
//! [`ScanConfig`] carries the knobs the pipeline honours: worker pool size,
//! the chunked-reader bounds, the per-evaluation policy timeout, and the
//! source filters. Callers construct it in code or load it from a TOML file;
//! every field has a serde default so partial files work.
//!
//! ```toml
//! # stacklint.toml
//! worker_count = 8
//! max_file_size = 5242880
//! exclude = ["vendored", "third_party"]
//!
//! [limits]
//! eval_timeout_secs = 60
//! output_lines = 3
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Size of one read chunk: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Hard cap on a single source file: 5 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

const fn default_worker_count() -> usize {
    8
}

const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

const fn default_max_file_size() -> usize {
    DEFAULT_MAX_FILE_SIZE
}

fn default_extensions() -> Vec<String> {
    ["tf", "yaml", "yml", "json", "dockerfile"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Evaluation limits, grouped so the TOML file reads naturally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-(policy, file) evaluation timeout in seconds.
    #[serde(default = "LimitsConfig::default_eval_timeout_secs")]
    pub eval_timeout_secs: u64,
    /// How many excerpted lines to attach around each finding.
    #[serde(default = "LimitsConfig::default_output_lines")]
    pub output_lines: usize,
}

impl LimitsConfig {
    const fn default_eval_timeout_secs() -> u64 {
        60
    }

    const fn default_output_lines() -> usize {
        3
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            eval_timeout_secs: Self::default_eval_timeout_secs(),
            output_lines: Self::default_output_lines(),
        }
    }
}

/// Configuration for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Bound on concurrent (policy, file) evaluations and concurrent parses.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Streaming read chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Reject files whose cumulative size exceeds this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// File extensions routed to the parser (lowercase, no leading dot).
    /// Files named `Dockerfile` and chart directories are recognized
    /// regardless of this list.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Path substrings excluded from the walk. Hidden directories and
    /// `.git` are always skipped.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Evaluation limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            chunk_size: default_chunk_size(),
            max_file_size: default_max_file_size(),
            extensions: default_extensions(),
            exclude: Vec::new(),
            limits: LimitsConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be non-zero".into()));
        }
        if self.max_file_size < self.chunk_size {
            return Err(Error::Config(
                "max_file_size must be at least one chunk".into(),
            ));
        }
        Ok(())
    }

    /// Whether a path is excluded by configuration.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.exclude.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = ScanConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);
        assert!(config.validate().is_ok());
        assert!(config.extensions.iter().any(|e| e == "tf"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "worker_count = 2\nexclude = [\"vendor\"]\n").unwrap();
        let config = ScanConfig::load_from(file.path()).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.is_excluded(Path::new("a/vendor/b.tf")));
        assert!(!config.is_excluded(Path::new("a/src/b.tf")));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ScanConfig {
            worker_count: 0,
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn cap_below_chunk_rejected() {
        let config = ScanConfig {
            max_file_size: 10,
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
