//! Error types and handling for stacklint-core operations.
//!
//! One enum covers every failure in the scan pipeline. The taxonomy matters
//! operationally: some variants are fatal for a whole scan (root I/O, policy
//! bundle load, storage), while others are isolated to a single file or a
//! single (policy, file) pair and only remove that unit's findings.
//!
//! ## Fatal vs isolated
//!
//! | Variant | Scope |
//! |---|---|
//! | [`Error::Io`] at the scan root, [`Error::PolicyLoad`], [`Error::Storage`], [`Error::Config`], [`Error::Canceled`] | scan |
//! | [`Error::Parse`], [`Error::Resolve`], [`Error::FileTooLarge`] | one file / chart |
//! | [`Error::PolicyEval`], [`Error::EvalTimeout`] | one (policy, file) pair |
//!
//! The scan service consults [`Error::category`] when deciding whether to log
//! and continue or to abort.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stacklint-core operations.
///
/// All public functions in stacklint-core return `Result<T, Error>`.
/// Conversions from the underlying format-parser errors are provided so the
/// pipeline can use `?` throughout.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Fatal when it happens at the scan root (the walk cannot start);
    /// isolated when a single file read fails mid-scan.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A source file could not be parsed into documents.
    ///
    /// The file is excluded from inspection; the scan continues.
    #[error("parse error in '{file}': {reason}")]
    Parse {
        /// Path of the offending source file.
        file: PathBuf,
        /// Backend-specific description of the failure.
        reason: String,
    },

    /// A template artifact (e.g. a Helm chart) could not be resolved.
    ///
    /// The chart's entire rendered output is skipped; partial renders are
    /// never inspected.
    #[error("resolve error for '{path}': {reason}")]
    Resolve {
        /// Chart or template path that failed to render.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The policy bundle failed to load or compile.
    ///
    /// Always fatal: inspecting with a partial bundle would silently
    /// under-report.
    #[error("policy bundle error: {0}")]
    PolicyLoad(String),

    /// A single policy evaluation failed at runtime.
    ///
    /// The (policy, file) pair contributes no findings; the scan continues.
    #[error("policy '{query_id}' failed on '{file}': {reason}")]
    PolicyEval {
        /// Identifier of the failing policy.
        query_id: String,
        /// File the policy was being evaluated against.
        file: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A policy evaluation exceeded the configured timeout.
    #[error("policy '{query_id}' timed out on '{file}'")]
    EvalTimeout {
        /// Identifier of the timed-out policy.
        query_id: String,
        /// File the policy was being evaluated against.
        file: PathBuf,
    },

    /// A source file exceeded the configured size cap.
    ///
    /// The file is skipped without buffering more than `limit + chunk` bytes.
    #[error("file '{path}' exceeds the {limit} byte limit")]
    FileTooLarge {
        /// Path of the oversized file.
        path: PathBuf,
        /// Configured maximum size in bytes.
        limit: usize,
    },

    /// Storage backend failure.
    ///
    /// Propagated: if persistence is required the scan aborts.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("configuration error: {0}")]
    Config(String),

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The scan was cancelled via its context.
    #[error("scan cancelled")]
    Canceled,

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether the error poisons the whole scan or only its own unit of work.
    ///
    /// Per-file and per-pair errors return `false` and are logged and
    /// skipped; everything else surfaces to the caller.
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Parse { .. }
                | Self::Resolve { .. }
                | Self::PolicyEval { .. }
                | Self::EvalTimeout { .. }
                | Self::FileTooLarge { .. }
        )
    }

    /// Check if the error might be recoverable through retry logic.
    ///
    /// Timeouts and interrupted I/O may succeed on retry; malformed input and
    /// configuration never will.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::EvalTimeout { .. } | Self::Storage(_) => true,
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Stable category label for logging and metrics.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Parse { .. } => "parse",
            Self::Resolve { .. } => "resolve",
            Self::PolicyLoad(_) => "policy-load",
            Self::PolicyEval { .. } => "policy-eval",
            Self::EvalTimeout { .. } => "timeout",
            Self::FileTooLarge { .. } => "resource-limit",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not-found",
            Self::Canceled => "cancelled",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenient result alias for stacklint-core operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_file_errors_are_not_fatal() {
        let err = Error::Parse {
            file: PathBuf::from("bad.yaml"),
            reason: "mapping values are not allowed here".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.category(), "parse");

        let err = Error::FileTooLarge {
            path: PathBuf::from("huge.json"),
            limit: 5 * 1024 * 1024,
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn pipeline_errors_are_fatal() {
        assert!(Error::PolicyLoad("bad metadata".into()).is_fatal());
        assert!(Error::Storage("backend unavailable".into()).is_fatal());
        assert!(Error::Canceled.is_fatal());
    }

    #[test]
    fn timeout_is_recoverable() {
        let err = Error::EvalTimeout {
            query_id: "q".into(),
            file: PathBuf::from("a.tf"),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }
}
