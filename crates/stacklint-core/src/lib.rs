//! # stacklint-core
//!
//! Core scan pipeline for static analysis of Infrastructure-as-Code:
//! Terraform, Kubernetes manifests, CloudFormation, Ansible, Dockerfiles,
//! and Helm charts. The crate ingests a tree of source files, normalizes
//! every artifact into one document model, evaluates a declarative policy
//! bundle against those documents, and emits vulnerabilities with precise
//! source-line attribution.
//!
//! ## Architecture
//!
//! The pipeline flows through narrow seams, one module per stage:
//!
//! - **Provider** ([`provider`]): walks input roots, routing artifacts to
//!   parse or resolve sinks
//! - **Resolver** ([`resolver`]): renders Helm charts into manifests with
//!   split markers and line maps
//! - **Parser** ([`parser`]): multi-format conversion into canonical
//!   document trees
//! - **Engine** ([`engine`]): policy bundle loading and tree-pattern
//!   evaluation
//! - **Detector** ([`detector`]): textual mapping of findings back to
//!   original source lines
//! - **Storage** ([`storage`]): the append-only persistence contract
//! - **Service** ([`service`]): the orchestrator tying the stages together
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use stacklint_core::{MemoryStorage, PolicyBundle, ScanConfig, ScanService};
//!
//! # async fn example() -> stacklint_core::Result<()> {
//! let bundle = PolicyBundle::load(Path::new("policies"))?;
//! let storage = Arc::new(MemoryStorage::new());
//! let service = ScanService::new(ScanConfig::default(), bundle, storage)?;
//!
//! let report = service.scan("scan-1", Path::new("deploy/")).await?;
//! for vuln in &report.vulnerabilities {
//!     println!(
//!         "{}:{} [{}] {}",
//!         vuln.file_name.display(),
//!         vuln.line,
//!         vuln.severity,
//!         vuln.query_name
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure isolation
//!
//! Per-file errors (unparseable input, broken charts, oversized files) and
//! per-(policy, file) errors are logged and skipped; only root I/O, bundle
//! loading, and storage failures abort a scan. See [`Error::is_fatal`].
//!
//! ## Determinism
//!
//! Two scans of the same tree and bundle yield the same vulnerability set,
//! and the reported list is canonically sorted by
//! `(file_name, line, query_id, search_key)`.

/// Scan configuration and resource limits
pub mod config;
/// Line attribution from search keys to source lines
pub mod detector;
/// Policy bundle loading and evaluation
pub mod engine;
/// Error types and result aliases
pub mod error;
/// Multi-format parsing into canonical documents
pub mod parser;
/// Source discovery over filesystem roots
pub mod provider;
/// Chart rendering with line provenance
pub mod resolver;
/// Scan orchestration and cancellation
pub mod service;
/// The append-only document store contract
pub mod storage;
/// Progress counters
pub mod tracker;
/// Core data types and structures
pub mod types;

// Re-export commonly used types
pub use config::{LimitsConfig, ScanConfig};
pub use detector::LineDetector;
pub use engine::{Inspector, Policy, PolicyBundle, PolicyMetadata};
pub use error::{Error, Result};
pub use parser::{ParsedFile, Parser};
pub use provider::{FileSystemProvider, SourceSink};
pub use resolver::{HELM_ID_PREFIX, RenderedFile, ResolvedOutput, Resolver};
pub use service::{ScanContext, ScanReport, ScanService};
pub use storage::{MemoryStorage, Storage};
pub use tracker::{CounterTracker, Tracker, TrackerTotals};
pub use types::*;
