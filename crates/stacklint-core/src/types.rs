//! Core data structures for the scan pipeline.
//!
//! This module defines the types that flow between pipeline stages:
//!
//! - **Ingest**: [`FileKind`], [`FileMetadata`], [`Document`]
//! - **Findings**: [`RawFinding`], [`Vulnerability`], [`IssueType`], [`Severity`]
//! - **Line attribution**: [`VulnerabilityLines`], [`VulnerabilityLine`], [`IdInfo`]
//! - **Aggregation**: [`SeveritySummary`]
//!
//! ## Serialization
//!
//! All record types implement `Serialize`/`Deserialize`. Document mappings
//! are backed by an order-preserving map so diagnostics keep the source key
//! order where the format allows it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parsed source file, canonicalized into a tree of scalars, sequences and
/// keyed mappings. Scalar types survive parsing: numbers stay numeric and
/// booleans stay boolean, which policies rely on for typed comparisons.
pub type Document = serde_json::Value;

/// Mapping from rendered line index to original template line index, 1-based.
pub type LinesMap = BTreeMap<usize, usize>;

/// Per-split line maps for a template-resolved file: split ordinal → rendered
/// line → original line.
pub type IdInfo = BTreeMap<usize, LinesMap>;

/// The recognized artifact families.
///
/// `Common` marks files that parsed but match no known platform; they are
/// stored for reference and skipped by the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Terraform / HCL configuration.
    Terraform,
    /// Kubernetes manifests.
    Kubernetes,
    /// CloudFormation templates (JSON or YAML).
    CloudFormation,
    /// Ansible playbooks.
    Ansible,
    /// Dockerfiles.
    Dockerfile,
    /// Helm-rendered manifests.
    Helm,
    /// Parseable but unrecognized input.
    Common,
}

impl FileKind {
    /// Whether documents of this kind are eligible for policy evaluation.
    pub const fn is_inspectable(self) -> bool {
        !matches!(self, Self::Common)
    }

    /// Policy platform name this kind maps to, as used in bundle metadata.
    ///
    /// Helm-rendered manifests are Kubernetes documents as far as policies
    /// are concerned.
    pub const fn platform(self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Kubernetes | Self::Helm => "kubernetes",
            Self::CloudFormation => "cloudformation",
            Self::Ansible => "ansible",
            Self::Dockerfile => "dockerfile",
            Self::Common => "common",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terraform => write!(f, "Terraform"),
            Self::Kubernetes => write!(f, "Kubernetes"),
            Self::CloudFormation => write!(f, "CloudFormation"),
            Self::Ansible => write!(f, "Ansible"),
            Self::Dockerfile => write!(f, "Dockerfile"),
            Self::Helm => write!(f, "Helm"),
            Self::Common => write!(f, "Common"),
        }
    }
}

/// One record per parsed document.
///
/// A single source file can produce several of these (YAML multi-document
/// streams, charts rendering many templates). Identity is the generated
/// [`FileMetadata::id`]; rendered sub-documents that share a `file_name` are
/// disambiguated by `helm_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Opaque unique id, generated at ingest.
    pub id: String,
    /// Caller-supplied scan group key.
    pub scan_id: String,
    /// Original path on disk. For rendered sub-documents this is the
    /// template path, not a rendered artifact path.
    pub file_name: PathBuf,
    /// Detected artifact family.
    pub kind: FileKind,
    /// Canonical document tree the policy engine queries.
    pub document: Document,
    /// Unmodified text of the source on disk.
    pub original_data: String,
    /// Post-resolution text when a resolver rewrote the input, else equal to
    /// `original_data`. For Helm this carries the injected split markers.
    pub content: String,
    /// Split marker identifying one rendered sub-document, empty for files
    /// that were not resolved.
    pub helm_id: String,
    /// Line maps inverting template rendering, empty for unresolved files.
    pub id_info: IdInfo,
}

impl FileMetadata {
    /// Create a metadata record for a directly-parsed file.
    pub fn new(
        scan_id: impl Into<String>,
        file_name: impl Into<PathBuf>,
        kind: FileKind,
        document: Document,
        original_data: impl Into<String>,
    ) -> Self {
        let original_data = original_data.into();
        Self {
            id: Uuid::new_v4().to_string(),
            scan_id: scan_id.into(),
            file_name: file_name.into(),
            kind,
            document,
            content: original_data.clone(),
            original_data,
            helm_id: String::new(),
            id_info: IdInfo::new(),
        }
    }

    /// Attach resolver output: rendered content, split marker and line maps.
    #[must_use]
    pub fn with_resolved(mut self, content: impl Into<String>, helm_id: impl Into<String>, id_info: IdInfo) -> Self {
        self.content = content.into();
        self.helm_id = helm_id.into();
        self.id_info = id_info;
        self
    }

    /// Whether this record came out of the Helm resolver.
    pub fn is_helm(&self) -> bool {
        !self.helm_id.is_empty()
    }
}

/// Severity of a policy, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational.
    Info,
    /// Low impact.
    Low,
    /// Medium impact.
    Medium,
    /// High impact.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// What kind of defect a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    /// A required attribute is absent.
    MissingAttribute,
    /// An attribute is present with a non-compliant value.
    IncorrectValue,
    /// An attribute is present that must not be.
    RedundantAttribute,
}

/// Engine output before metadata enrichment and line attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    /// Id of the [`FileMetadata`] whose document matched.
    pub document_id: String,
    /// Dotted path of the offending value, possibly carrying split markers
    /// and `key={{value}}` anchors.
    pub search_key: String,
    /// Defect classification.
    pub issue_type: IssueType,
    /// Human-readable statement of the compliant value.
    pub key_expected_value: String,
    /// The value actually found, rendered as text.
    pub key_actual_value: String,
}

/// A single excerpted source line around a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityLine {
    /// 1-based line number in the original source.
    pub position: usize,
    /// Verbatim line text.
    pub line: String,
}

/// Result of line attribution for one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityLines {
    /// 1-based line the finding refers to in the original source.
    pub line: usize,
    /// Surrounding excerpt, bounded by the configured window.
    pub vuln_lines: Vec<VulnerabilityLine>,
    /// Verbatim text of the attributed line.
    pub line_with_vulnerability: String,
}

impl VulnerabilityLines {
    /// Attribution used when a file has no content to search.
    pub fn unknown() -> Self {
        Self {
            line: 1,
            vuln_lines: Vec::new(),
            line_with_vulnerability: String::new(),
        }
    }
}

/// A fully-enriched finding, ready for storage and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Scan group key, copied from the file.
    pub scan_id: String,
    /// Id of the file record the finding belongs to.
    pub file_id: String,
    /// Original path of the offending file.
    pub file_name: PathBuf,
    /// Stable policy identifier.
    pub query_id: String,
    /// Human-readable policy name.
    pub query_name: String,
    /// Policy severity.
    pub severity: Severity,
    /// Policy category, e.g. "Encryption".
    pub category: String,
    /// Short description of what the policy enforces.
    pub description: String,
    /// Link to further documentation, if the policy carries one.
    pub description_url: Option<String>,
    /// Platform the policy targets.
    pub platform: String,
    /// 1-based line in the original source.
    pub line: usize,
    /// Excerpted source lines around the finding.
    pub vuln_lines: Vec<VulnerabilityLine>,
    /// Search key the engine produced for the finding.
    pub search_key: String,
    /// Defect classification.
    pub issue_type: IssueType,
    /// Expected value, from the failing check.
    pub key_expected_value: String,
    /// Actual value found in the document.
    pub key_actual_value: String,
}

/// Count of vulnerabilities grouped by severity for one or more scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    /// Scan ids the summary covers.
    pub scan_ids: Vec<String>,
    /// Per-severity counts; severities with zero findings are present with 0.
    pub counters: BTreeMap<Severity, usize>,
    /// Total finding count across all severities.
    pub total: usize,
}

impl SeveritySummary {
    /// Build a summary over a set of vulnerabilities.
    pub fn from_vulnerabilities(scan_ids: Vec<String>, vulns: &[Vulnerability]) -> Self {
        let mut counters: BTreeMap<Severity, usize> = [
            (Severity::Info, 0),
            (Severity::Low, 0),
            (Severity::Medium, 0),
            (Severity::High, 0),
        ]
        .into_iter()
        .collect();
        for vuln in vulns {
            *counters.entry(vuln.severity).or_insert(0) += 1;
        }
        Self {
            scan_ids,
            total: vulns.len(),
            counters,
        }
    }
}

/// Canonical ordering for reproducible reporting:
/// `(file_name, line, query_id, search_key)`.
pub fn canonical_sort(vulns: &mut [Vulnerability]) {
    vulns.sort_by(|a, b| {
        a.file_name
            .cmp(&b.file_name)
            .then(a.line.cmp(&b.line))
            .then(a.query_id.cmp(&b.query_id))
            .then(a.search_key.cmp(&b.search_key))
    });
}
