//! Declarative rule evaluation against documents.
//!
//! Evaluation walks the document for the rule's `target` pattern, collecting
//! candidate nodes together with the concrete path that reached them, then
//! applies each check. Search keys are built from those concrete paths:
//! sequence elements contribute a `name={{<name>}}` anchor when they carry
//! one, a plain index otherwise, and Kubernetes/Helm/Dockerfile documents
//! get their platform anchor prefixed.
//!
//! Results are in document order, which together with the id-sorted bundle
//! gives deterministic findings for a given (policy, file) pair.

use serde_json::Value;

use super::policy::{Check, Condition, Op, Policy};
use crate::types::{FileKind, FileMetadata, IssueType, RawFinding};
use crate::Result;

/// Evaluate one policy against one file's document.
pub fn evaluate(policy: &Policy, file: &FileMetadata) -> Result<Vec<RawFinding>> {
    let pattern: Vec<&str> = split_pattern(&policy.rule.target);
    let candidates = resolve(&file.document, &pattern);
    let anchor = anchor_for(file);

    let mut findings = Vec::new();
    for (path, node) in candidates {
        for check in &policy.rule.checks {
            if !check.when.iter().all(|cond| condition_holds(node, cond)) {
                continue;
            }
            apply_check(file, &anchor, &path, node, check, &mut findings);
        }
    }
    Ok(findings)
}

fn apply_check(
    file: &FileMetadata,
    anchor: &[String],
    target_path: &[String],
    node: &Value,
    check: &Check,
    findings: &mut Vec<RawFinding>,
) {
    let pattern = split_pattern(&check.path);
    let resolved = resolve(node, &pattern);

    if resolved.is_empty() {
        if !check.op.needs_value() {
            return;
        }
        let ancestor = nearest_ancestor(node, &pattern);
        findings.push(RawFinding {
            document_id: file.id.clone(),
            search_key: build_search_key(file, anchor, target_path, &ancestor),
            issue_type: check.issue_type.unwrap_or(IssueType::MissingAttribute),
            key_expected_value: expected_text(check),
            key_actual_value: "undefined".to_string(),
        });
        return;
    }

    for (subpath, value) in resolved {
        if satisfies(value, check.op, check.value.as_ref()) {
            continue;
        }
        findings.push(RawFinding {
            document_id: file.id.clone(),
            search_key: build_search_key(file, anchor, target_path, &subpath),
            issue_type: check
                .issue_type
                .unwrap_or_else(|| check.op.default_issue_type()),
            key_expected_value: expected_text(check),
            key_actual_value: render_value(value),
        });
    }
}

/// Whether `value` meets the requirement `op`/`operand`.
fn satisfies(value: &Value, op: Op, operand: Option<&Value>) -> bool {
    match op {
        Op::Exists => true,
        Op::Absent => false,
        Op::Eq => operand.is_some_and(|o| loose_eq(value, o)),
        Op::Ne => !operand.is_some_and(|o| loose_eq(value, o)),
        Op::In => operand
            .and_then(Value::as_array)
            .is_some_and(|list| list.iter().any(|o| loose_eq(value, o))),
        Op::NotIn => !operand
            .and_then(Value::as_array)
            .is_some_and(|list| list.iter().any(|o| loose_eq(value, o))),
        Op::Regex => regex_matches(value, operand),
        Op::NotRegex => !regex_matches(value, operand),
        Op::Contains => match (value, operand) {
            (Value::Array(items), Some(o)) => items.iter().any(|item| loose_eq(item, o)),
            (value, Some(o)) => render_value(value).contains(&render_value(o)),
            (_, None) => false,
        },
        Op::Lt => numeric(value)
            .zip(operand.and_then(numeric))
            .is_some_and(|(v, o)| v < o),
        Op::Gt => numeric(value)
            .zip(operand.and_then(numeric))
            .is_some_and(|(v, o)| v > o),
    }
}

/// Equality tolerant of scalar-representation drift between formats: equal
/// values match, and otherwise so do equal textual renderings.
fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || (a.is_object() == b.is_object() && render_value(a) == render_value(b))
}

fn regex_matches(value: &Value, operand: Option<&Value>) -> bool {
    let Some(pattern) = operand.and_then(Value::as_str) else {
        return false;
    };
    // Patterns were compiled at bundle load; failure here means the bundle
    // was bypassed, treat as non-matching.
    regex::Regex::new(pattern).is_ok_and(|re| re.is_match(&render_value(value)))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A precondition holds when its path requirement is met on the node.
fn condition_holds(node: &Value, condition: &Condition) -> bool {
    let pattern = split_pattern(&condition.path);
    let resolved = resolve(node, &pattern);
    if resolved.is_empty() {
        return !condition.op.needs_value();
    }
    resolved
        .iter()
        .any(|(_, value)| satisfies(value, condition.op, condition.value.as_ref()))
}

fn split_pattern(path: &str) -> Vec<&str> {
    if path.is_empty() || path == "." {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Collect `(concrete_path, node)` pairs matching a wildcard pattern.
fn resolve<'a>(root: &'a Value, pattern: &[&str]) -> Vec<(Vec<String>, &'a Value)> {
    let mut out = Vec::new();
    walk(root, pattern, &mut Vec::new(), &mut out);
    out
}

fn walk<'a>(
    node: &'a Value,
    pattern: &[&str],
    path: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, &'a Value)>,
) {
    let Some((segment, rest)) = pattern.split_first() else {
        out.push((path.clone(), node));
        return;
    };
    match (*segment, node) {
        ("*", Value::Object(map)) => {
            for (key, value) in map {
                path.push(key.clone());
                walk(value, rest, path, out);
                path.pop();
            }
        }
        ("*", Value::Array(items)) => {
            for (index, value) in items.iter().enumerate() {
                path.push(element_segment(value, index));
                walk(value, rest, path, out);
                path.pop();
            }
        }
        (key, Value::Object(map)) => {
            if let Some(value) = map.get(key) {
                path.push(key.to_string());
                walk(value, rest, path, out);
                path.pop();
            }
        }
        (key, Value::Array(items)) => {
            if let Some(value) = key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                path.push(key.to_string());
                walk(value, rest, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Sequence elements are addressed by their `name` when they have one; the
/// line detector can anchor on that where an index means nothing textually.
fn element_segment(value: &Value, index: usize) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| index.to_string(), |name| format!("name={{{{{name}}}}}"))
}

/// Deepest prefix of `pattern` that resolves in `node`; used to place
/// missing-attribute findings at the closest existing scope.
fn nearest_ancestor(node: &Value, pattern: &[&str]) -> Vec<String> {
    for take in (0..pattern.len()).rev() {
        let resolved = resolve(node, &pattern[..take]);
        if let Some((path, _)) = resolved.into_iter().next() {
            return path;
        }
    }
    Vec::new()
}

/// Platform anchor segments prefixed to every search key of the file.
fn anchor_for(file: &FileMetadata) -> Vec<String> {
    let mut anchor = Vec::new();
    if file.is_helm() {
        anchor.push(file.helm_id.clone());
    }
    match file.kind {
        FileKind::Kubernetes | FileKind::Helm => {
            if let Some(name) = file
                .document
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
            {
                anchor.push("metadata".to_string());
                anchor.push(format!("name={{{{{name}}}}}"));
            }
        }
        _ => {}
    }
    anchor
}

fn build_search_key(
    file: &FileMetadata,
    anchor: &[String],
    target_path: &[String],
    subpath: &[String],
) -> String {
    if file.kind == FileKind::Dockerfile {
        return dockerfile_search_key(file, target_path, subpath);
    }
    anchor
        .iter()
        .chain(target_path.iter())
        .chain(subpath.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join(".")
}

/// Dockerfile keys follow the `FROM={{stage}}.CMD={{first arg}}` convention;
/// attribute paths inside an instruction mean nothing textually.
fn dockerfile_search_key(file: &FileMetadata, target_path: &[String], subpath: &[String]) -> String {
    let full: Vec<&String> = target_path.iter().chain(subpath.iter()).collect();
    // Expected shape: command.<stage>[.<instruction index>[...]]
    let Some(stage) = full.get(1) else {
        return full
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(".");
    };
    let mut key = format!("FROM={{{{{stage}}}}}");
    if let Some(index_segment) = full.get(2) {
        let instruction = file
            .document
            .get("command")
            .and_then(|c| c.get(stage.as_str()))
            .and_then(Value::as_array)
            .and_then(|items| index_segment.parse::<usize>().ok().and_then(|i| items.get(i)));
        if let Some(instruction) = instruction {
            let cmd = instruction
                .get("Cmd")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            let arg = instruction
                .get("Value")
                .and_then(|v| v.get(0))
                .and_then(Value::as_str)
                .unwrap_or_default();
            key.push_str(&format!(".{cmd}={{{{{arg}}}}}"));
        }
    }
    key
}

fn expected_text(check: &Check) -> String {
    if let Some(expected) = &check.expected {
        return expected.clone();
    }
    let leaf = check.path.rsplit('.').next().unwrap_or(&check.path);
    let operand = check
        .value
        .as_ref()
        .map(render_value)
        .unwrap_or_default();
    match check.op {
        Op::Eq => format!("'{leaf}' should equal '{operand}'"),
        Op::Ne => format!("'{leaf}' should not equal '{operand}'"),
        Op::In => format!("'{leaf}' should be one of {operand}"),
        Op::NotIn => format!("'{leaf}' should not be one of {operand}"),
        Op::Regex => format!("'{leaf}' should match '{operand}'"),
        Op::NotRegex => format!("'{leaf}' should not match '{operand}'"),
        Op::Exists => format!("'{leaf}' should be defined"),
        Op::Absent => format!("'{leaf}' should not be defined"),
        Op::Contains => format!("'{leaf}' should contain '{operand}'"),
        Op::Lt => format!("'{leaf}' should be lower than '{operand}'"),
        Op::Gt => format!("'{leaf}' should be higher than '{operand}'"),
    }
}
