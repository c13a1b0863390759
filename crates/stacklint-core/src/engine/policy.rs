//! Policy metadata and the declarative rule language.
//!
//! A policy is one directory in the bundle: `metadata.json` (identity,
//! severity, category, descriptions) plus `rule.yaml`, the executable body.
//! The body is a tree-pattern: a `target` path selecting candidate nodes and
//! a list of checks, each stating a requirement that must hold on every
//! candidate. A finding is produced where a requirement fails.
//!
//! ```yaml
//! target: resource.aws_cloudfront_distribution.*
//! checks:
//!   - when:
//!       - path: viewer_certificate.cloudfront_default_certificate
//!         op: eq
//!         value: false
//!     path: viewer_certificate.minimum_protocol_version
//!     op: in
//!     value: ["TLSv1.2_2019", "TLSv1.2_2021"]
//!     expected: "'minimum_protocol_version' is TLSv1.2_2019 or higher"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{Document, IssueType, Severity};

/// Identity and presentation metadata, from `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMetadata {
    /// Stable policy identifier (GUID-like).
    pub id: String,
    /// Human-readable policy name.
    pub query_name: String,
    /// Severity assigned to findings.
    pub severity: Severity,
    /// Category, e.g. "Encryption".
    pub category: String,
    /// Short description of what the policy enforces.
    pub description_text: String,
    /// Link to further documentation.
    #[serde(default)]
    pub description_url: Option<String>,
    /// Platform the policy applies to (`terraform`, `kubernetes`, ...).
    pub platform: String,
}

/// Comparison operators a check or precondition can use.
///
/// Each op states the *requirement*; the check fires when it does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Value must equal `value`.
    Eq,
    /// Value must differ from `value`.
    Ne,
    /// Value must be one of `value` (a sequence).
    In,
    /// Value must not be one of `value` (a sequence).
    NotIn,
    /// Value must match `value` as a regular expression.
    Regex,
    /// Value must not match `value` as a regular expression.
    NotRegex,
    /// The path must be present.
    Exists,
    /// The path must be absent.
    Absent,
    /// String value must contain `value` as a substring.
    Contains,
    /// Numeric value must be strictly less than `value`.
    Lt,
    /// Numeric value must be strictly greater than `value`.
    Gt,
}

impl Op {
    /// Whether the requirement needs the path to resolve to a value.
    pub const fn needs_value(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Default classification when a check using this op fires on a present
    /// value.
    pub const fn default_issue_type(self) -> IssueType {
        match self {
            Self::Absent => IssueType::RedundantAttribute,
            _ => IssueType::IncorrectValue,
        }
    }
}

/// A predicate over a candidate node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Path relative to the candidate node; `*` matches one level.
    pub path: String,
    /// Requirement operator.
    pub op: Op,
    /// Comparison operand, where the op takes one.
    #[serde(default)]
    pub value: Option<Document>,
}

/// One requirement of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    /// Preconditions; the check only applies where all of them hold.
    #[serde(default)]
    pub when: Vec<Condition>,
    /// Path relative to the candidate node; `*` matches one level.
    pub path: String,
    /// Requirement operator.
    pub op: Op,
    /// Comparison operand, where the op takes one.
    #[serde(default)]
    pub value: Option<Document>,
    /// Override for the finding's issue classification.
    #[serde(default)]
    pub issue_type: Option<IssueType>,
    /// Human statement of the compliant value; generated when omitted.
    #[serde(default)]
    pub expected: Option<String>,
}

/// The executable rule body, from `rule.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Wildcard path selecting candidate nodes in a document.
    pub target: String,
    /// Requirements evaluated on each candidate.
    pub checks: Vec<Check>,
}

/// A loaded policy: metadata, body, and where it came from.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Parsed `metadata.json`.
    pub metadata: PolicyMetadata,
    /// Parsed `rule.yaml`.
    pub rule: Rule,
    /// Policy directory inside the bundle.
    pub dir: PathBuf,
    /// Positive/negative self-test fixtures found under `test/`.
    pub fixtures: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_uses_bundle_key_names() {
        let metadata: PolicyMetadata = serde_json::from_str(
            r#"{
                "id": "3a07a968-7c61-43e6-bbd5-0b069c27f628",
                "queryName": "CloudFront Without Minimum Protocol TLS 1.2",
                "severity": "HIGH",
                "category": "Encryption",
                "descriptionText": "CloudFront Minimum Protocol version should be at least TLS 1.2",
                "descriptionUrl": "https://registry.terraform.io/providers/hashicorp/aws/latest/docs/resources/cloudfront_distribution",
                "platform": "terraform"
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.severity, Severity::High);
        assert_eq!(metadata.platform, "terraform");
    }

    #[test]
    fn rule_bodies_deserialize_from_yaml() {
        let rule: Rule = serde_yaml::from_str(
            "target: resource.aws_lambda_permission.*\nchecks:\n  - path: principal\n    op: ne\n    value: \"*\"\n",
        )
        .unwrap();
        assert_eq!(rule.checks.len(), 1);
        assert_eq!(rule.checks[0].op, Op::Ne);
        assert!(rule.checks[0].when.is_empty());
    }

    #[test]
    fn op_defaults() {
        assert!(!Op::Absent.needs_value());
        assert!(Op::Eq.needs_value());
        assert_eq!(Op::Absent.default_issue_type(), IssueType::RedundantAttribute);
        assert_eq!(Op::Regex.default_issue_type(), IssueType::IncorrectValue);
    }
}
