//! Policy engine: bundle execution over parsed files.
//!
//! The [`Inspector`] owns the loaded [`PolicyBundle`] and drives evaluation:
//! files are grouped by kind, matched to the policies of their platform, and
//! each (policy, file) pair is evaluated inside the worker pool under the
//! configured timeout. Raw findings are enriched with policy metadata and
//! line attribution before they leave this module.
//!
//! Failure isolation: an evaluation error or timeout drops that pair's
//! findings, logs, and moves on. Only bundle loading is fatal.

pub mod bundle;
pub mod eval;
pub mod policy;

pub use bundle::PolicyBundle;
pub use policy::{Check, Condition, Op, Policy, PolicyMetadata, Rule};

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::detector::LineDetector;
use crate::service::ScanContext;
use crate::tracker::Tracker;
use crate::types::{FileMetadata, Vulnerability, canonical_sort};
use crate::{Error, Result};

/// Evaluates the policy bundle against scanned files.
#[derive(Debug)]
pub struct Inspector {
    bundle: PolicyBundle,
    detector: LineDetector,
    worker_count: usize,
    eval_timeout: Duration,
    output_lines: usize,
}

impl Inspector {
    /// Create an inspector over a loaded bundle.
    pub fn new(bundle: PolicyBundle, config: &ScanConfig) -> Self {
        Self {
            bundle,
            detector: LineDetector::new(),
            worker_count: config.worker_count.max(1),
            eval_timeout: Duration::from_secs(config.limits.eval_timeout_secs),
            output_lines: config.limits.output_lines,
        }
    }

    /// The loaded bundle.
    pub const fn bundle(&self) -> &PolicyBundle {
        &self.bundle
    }

    /// Evaluate every applicable policy against every file.
    ///
    /// The returned list is canonically sorted by
    /// `(file_name, line, query_id, search_key)` so downstream reporting is
    /// reproducible.
    pub async fn inspect(
        &self,
        files: &[FileMetadata],
        ctx: &ScanContext,
        tracker: &dyn Tracker,
    ) -> Result<Vec<Vulnerability>> {
        let eligible: Vec<&FileMetadata> = files
            .iter()
            .filter(|file| file.kind.is_inspectable())
            .collect();
        debug!(
            eligible = eligible.len(),
            skipped = files.len() - eligible.len(),
            "starting inspection"
        );

        let per_file: Vec<Vec<Vulnerability>> = futures::stream::iter(eligible)
            .map(|file| async move {
                if ctx.is_cancelled() {
                    return Vec::new();
                }
                let vulns = self.inspect_file(file).await;
                tracker.track_file_evaluated();
                vulns
            })
            .buffer_unordered(self.worker_count)
            .collect()
            .await;

        if ctx.is_cancelled() {
            return Err(Error::Canceled);
        }

        let mut vulnerabilities: Vec<Vulnerability> = per_file.into_iter().flatten().collect();
        canonical_sort(&mut vulnerabilities);
        Ok(vulnerabilities)
    }

    /// Evaluate all of one file's policies; per-pair failures are logged and
    /// contribute nothing.
    async fn inspect_file(&self, file: &FileMetadata) -> Vec<Vulnerability> {
        let policies = self.bundle.for_platform(file.kind.platform());
        let mut vulnerabilities = Vec::new();
        for policy in policies {
            let task_policy = policy.clone();
            let task_file = file.clone();
            let detector = self.detector;
            let output_lines = self.output_lines;
            let handle = tokio::task::spawn_blocking(move || {
                evaluate_pair(&task_policy, &task_file, &detector, output_lines)
            });

            match tokio::time::timeout(self.eval_timeout, handle).await {
                Ok(Ok(Ok(mut pair))) => vulnerabilities.append(&mut pair),
                Ok(Ok(Err(err))) => {
                    warn!(
                        query = %policy.metadata.id,
                        file = %file.file_name.display(),
                        error = %err,
                        "policy evaluation failed"
                    );
                }
                Ok(Err(join_err)) => {
                    warn!(
                        query = %policy.metadata.id,
                        file = %file.file_name.display(),
                        error = %join_err,
                        "policy evaluation task aborted"
                    );
                }
                Err(_) => {
                    let err = Error::EvalTimeout {
                        query_id: policy.metadata.id.clone(),
                        file: file.file_name.clone(),
                    };
                    warn!(error = %err, "policy evaluation timed out");
                }
            }
        }
        vulnerabilities
    }
}

/// Evaluate one (policy, file) pair and enrich the findings.
///
/// Findings are ordered by search key; with the bundle id-sorted this keeps
/// a file's vulnerabilities ordered by `(query_id, search_key)`.
fn evaluate_pair(
    policy: &Policy,
    file: &FileMetadata,
    detector: &LineDetector,
    output_lines: usize,
) -> Result<Vec<Vulnerability>> {
    let mut findings = eval::evaluate(policy, file)?;
    findings.sort_by(|a, b| a.search_key.cmp(&b.search_key));

    Ok(findings
        .into_iter()
        .map(|finding| {
            let lines = detector.detect(file, &finding.search_key, output_lines);
            Vulnerability {
                scan_id: file.scan_id.clone(),
                file_id: file.id.clone(),
                file_name: file.file_name.clone(),
                query_id: policy.metadata.id.clone(),
                query_name: policy.metadata.query_name.clone(),
                severity: policy.metadata.severity,
                category: policy.metadata.category.clone(),
                description: policy.metadata.description_text.clone(),
                description_url: policy.metadata.description_url.clone(),
                platform: policy.metadata.platform.clone(),
                line: lines.line,
                vuln_lines: lines.vuln_lines,
                search_key: finding.search_key,
                issue_type: finding.issue_type,
                key_expected_value: finding.key_expected_value,
                key_actual_value: finding.key_actual_value,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::policy::{PolicyMetadata, Rule};
    use crate::tracker::CounterTracker;
    use crate::types::{FileKind, Severity};
    use std::fs;
    use std::path::Path;

    fn write_policy(root: &Path, platform: &str, name: &str, id: &str, rule: &str) {
        let dir = root.join(platform).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("metadata.json"),
            format!(
                r#"{{"id": "{id}", "queryName": "{name}", "severity": "MEDIUM", "category": "Networking", "descriptionText": "d", "platform": "{platform}"}}"#
            ),
        )
        .unwrap();
        fs::write(dir.join("rule.yaml"), rule).unwrap();
    }

    fn tf_file(name: &str, source: &str) -> FileMetadata {
        let parsed = crate::parser::Parser::new()
            .parse(Path::new(name), source)
            .unwrap();
        FileMetadata::new(
            "scan",
            name,
            parsed.kind,
            parsed.documents.into_iter().next().unwrap(),
            source,
        )
    }

    #[tokio::test]
    async fn inspects_matching_platform_only() {
        let bundle_dir = tempfile::tempdir().unwrap();
        write_policy(
            bundle_dir.path(),
            "terraform",
            "acl_private",
            "acl-1",
            "target: resource.aws_s3_bucket.*\nchecks:\n  - path: acl\n    op: ne\n    value: public-read\n",
        );
        let bundle = PolicyBundle::load(bundle_dir.path()).unwrap();
        let inspector = Inspector::new(bundle, &ScanConfig::default());

        let files = vec![
            tf_file(
                "bucket.tf",
                "resource \"aws_s3_bucket\" \"logs\" {\n  acl = \"public-read\"\n}\n",
            ),
            FileMetadata::new(
                "scan",
                "values.yaml",
                FileKind::Common,
                serde_json::json!({"a": 1}),
                "a: 1\n",
            ),
        ];
        let tracker = CounterTracker::new();
        let ctx = ScanContext::new();
        let vulns = inspector.inspect(&files, &ctx, &tracker).await.unwrap();

        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].query_id, "acl-1");
        assert_eq!(vulns[0].severity, Severity::Medium);
        assert_eq!(vulns[0].line, 2);
        // Common file was skipped, terraform file evaluated.
        assert_eq!(tracker.totals().evaluated, 1);
    }

    #[tokio::test]
    async fn output_is_canonically_sorted() {
        let bundle_dir = tempfile::tempdir().unwrap();
        write_policy(
            bundle_dir.path(),
            "terraform",
            "b_acl",
            "q-b",
            "target: resource.aws_s3_bucket.*\nchecks:\n  - path: acl\n    op: ne\n    value: public-read\n",
        );
        write_policy(
            bundle_dir.path(),
            "terraform",
            "a_versioning",
            "q-a",
            "target: resource.aws_s3_bucket.*\nchecks:\n  - path: versioning\n    op: exists\n",
        );
        let bundle = PolicyBundle::load(bundle_dir.path()).unwrap();
        let inspector = Inspector::new(bundle, &ScanConfig::default());

        let files = vec![
            tf_file(
                "b.tf",
                "resource \"aws_s3_bucket\" \"one\" {\n  acl = \"public-read\"\n}\n",
            ),
            tf_file(
                "a.tf",
                "resource \"aws_s3_bucket\" \"two\" {\n  acl = \"public-read\"\n}\n",
            ),
        ];
        let tracker = CounterTracker::new();
        let ctx = ScanContext::new();
        let vulns = inspector.inspect(&files, &ctx, &tracker).await.unwrap();

        assert_eq!(vulns.len(), 4);
        let keys: Vec<(String, usize, String)> = vulns
            .iter()
            .map(|v| {
                (
                    v.file_name.display().to_string(),
                    v.line,
                    v.query_id.clone(),
                )
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(vulns[0].file_name, std::path::PathBuf::from("a.tf"));
    }

    #[tokio::test]
    async fn missing_required_attribute_is_reported() {
        let bundle_dir = tempfile::tempdir().unwrap();
        write_policy(
            bundle_dir.path(),
            "terraform",
            "good",
            "q-good",
            "target: resource.aws_s3_bucket.*\nchecks:\n  - path: acl\n    op: exists\n",
        );
        let bundle = PolicyBundle::load(bundle_dir.path()).unwrap();
        let inspector = Inspector::new(bundle, &ScanConfig::default());

        let files = vec![tf_file(
            "bucket.tf",
            "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"x\"\n}\n",
        )];
        let tracker = CounterTracker::new();
        let ctx = ScanContext::new();
        let vulns = inspector.inspect(&files, &ctx, &tracker).await.unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].issue_type, crate::types::IssueType::MissingAttribute);
    }

    #[tokio::test]
    async fn cancellation_surfaces() {
        let bundle_dir = tempfile::tempdir().unwrap();
        write_policy(
            bundle_dir.path(),
            "terraform",
            "p",
            "q",
            "target: resource.*\nchecks: []\n",
        );
        let bundle = PolicyBundle::load(bundle_dir.path()).unwrap();
        let inspector = Inspector::new(bundle, &ScanConfig::default());
        let tracker = CounterTracker::new();
        let ctx = ScanContext::new();
        ctx.cancel();
        let result = inspector.inspect(&[], &ctx, &tracker).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }

    #[test]
    fn pair_findings_are_search_key_ordered() {
        let rule: Rule = serde_yaml::from_str(
            "target: resource.aws_s3_bucket.*\nchecks:\n  - path: versioning\n    op: exists\n  - path: acl\n    op: ne\n    value: public-read\n",
        )
        .unwrap();
        let policy = Policy {
            metadata: PolicyMetadata {
                id: "q".into(),
                query_name: "Q".into(),
                severity: Severity::Low,
                category: "c".into(),
                description_text: String::new(),
                description_url: None,
                platform: "terraform".into(),
            },
            rule,
            dir: std::path::PathBuf::new(),
            fixtures: Vec::new(),
        };
        let file = tf_file(
            "b.tf",
            "resource \"aws_s3_bucket\" \"one\" {\n  acl = \"public-read\"\n}\n",
        );
        let vulns = evaluate_pair(&policy, &file, &LineDetector::new(), 3).unwrap();
        assert_eq!(vulns.len(), 2);
        assert!(vulns[0].search_key < vulns[1].search_key);
    }
}
