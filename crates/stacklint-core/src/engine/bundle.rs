//! Policy bundle loading.
//!
//! Bundle layout on disk: one directory per platform, one directory per
//! policy inside it. Each policy directory holds `metadata.json`,
//! `rule.yaml`, and optionally `test/` fixtures:
//!
//! ```text
//! policies/
//!   terraform/
//!     lambda_permission_principal_wildcard/
//!       metadata.json
//!       rule.yaml
//!       test/positive.tf
//!       test/negative.tf
//!   kubernetes/
//!     ...
//! ```
//!
//! The bundle is loaded once and immutable thereafter. Any malformed policy
//! fails the load: inspecting with a partial bundle would silently
//! under-report.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use super::policy::{Op, Policy, PolicyMetadata, Rule};
use crate::{Error, Result};

/// An immutable set of policies, grouped by platform.
#[derive(Debug, Default)]
pub struct PolicyBundle {
    by_platform: HashMap<String, Vec<Policy>>,
    total: usize,
}

impl PolicyBundle {
    /// Load every policy under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let mut by_platform: HashMap<String, Vec<Policy>> = HashMap::new();
        let mut total = 0usize;

        for platform_entry in sorted_dirs(root)? {
            let platform = platform_entry
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            for policy_dir in sorted_dirs(&platform_entry)? {
                let policy = load_policy(&policy_dir)?;
                if policy.metadata.platform != platform {
                    return Err(Error::PolicyLoad(format!(
                        "policy '{}' declares platform '{}' but lives under '{}'",
                        policy.metadata.id, policy.metadata.platform, platform
                    )));
                }
                by_platform.entry(platform.clone()).or_default().push(policy);
                total += 1;
            }
        }

        // Deterministic evaluation order regardless of directory listing.
        for policies in by_platform.values_mut() {
            policies.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        }
        debug!(total, platforms = by_platform.len(), "policy bundle loaded");
        Ok(Self { by_platform, total })
    }

    /// Policies applicable to a platform, in id order.
    pub fn for_platform(&self, platform: &str) -> &[Policy] {
        self.by_platform
            .get(platform)
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of loaded policies.
    pub const fn len(&self) -> usize {
        self.total
    }

    /// Whether the bundle holds no policies at all.
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// All policies across platforms, platform-sorted then id-sorted.
    pub fn policies(&self) -> Vec<&Policy> {
        let mut platforms: Vec<&String> = self.by_platform.keys().collect();
        platforms.sort();
        platforms
            .into_iter()
            .flat_map(|p| self.by_platform[p].iter())
            .collect()
    }
}

fn sorted_dirs(path: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut dirs: Vec<std::path::PathBuf> = fs::read_dir(path)
        .map_err(|e| Error::PolicyLoad(format!("cannot read '{}': {e}", path.display())))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn load_policy(dir: &Path) -> Result<Policy> {
    let metadata_raw = fs::read_to_string(dir.join("metadata.json")).map_err(|e| {
        Error::PolicyLoad(format!("'{}': cannot read metadata.json: {e}", dir.display()))
    })?;
    let metadata: PolicyMetadata = serde_json::from_str(&metadata_raw).map_err(|e| {
        Error::PolicyLoad(format!("'{}': malformed metadata.json: {e}", dir.display()))
    })?;

    let rule_raw = fs::read_to_string(dir.join("rule.yaml")).map_err(|e| {
        Error::PolicyLoad(format!("'{}': cannot read rule.yaml: {e}", dir.display()))
    })?;
    let rule: Rule = serde_yaml::from_str(&rule_raw).map_err(|e| {
        Error::PolicyLoad(format!("'{}': malformed rule.yaml: {e}", dir.display()))
    })?;
    compile_check(&metadata.id, &rule)?;

    let mut fixtures: Vec<std::path::PathBuf> = fs::read_dir(dir.join("test"))
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default();
    fixtures.sort();

    Ok(Policy {
        metadata,
        rule,
        dir: dir.to_path_buf(),
        fixtures,
    })
}

/// Compile-time validation: regex operands must compile, value-carrying ops
/// must carry one.
fn compile_check(id: &str, rule: &Rule) -> Result<()> {
    let conditions = rule.checks.iter().flat_map(|check| {
        check
            .when
            .iter()
            .map(|c| (c.op, c.value.as_ref()))
            .chain(std::iter::once((check.op, check.value.as_ref())))
    });
    for (op, value) in conditions {
        match op {
            Op::Regex | Op::NotRegex => {
                let pattern = value.and_then(|v| v.as_str()).ok_or_else(|| {
                    Error::PolicyLoad(format!("policy '{id}': regex op without a string pattern"))
                })?;
                Regex::new(pattern).map_err(|e| {
                    Error::PolicyLoad(format!("policy '{id}': invalid regex: {e}"))
                })?;
            }
            Op::In | Op::NotIn => {
                if !value.is_some_and(serde_json::Value::is_array) {
                    return Err(Error::PolicyLoad(format!(
                        "policy '{id}': in/not_in requires a sequence operand"
                    )));
                }
            }
            Op::Eq | Op::Ne | Op::Contains | Op::Lt | Op::Gt => {
                if value.is_none() {
                    return Err(Error::PolicyLoad(format!(
                        "policy '{id}': op requires an operand"
                    )));
                }
            }
            Op::Exists | Op::Absent => {}
        }
    }
    Ok(())
}
