//! Line attribution: mapping search keys back to source lines.
//!
//! The documents the engine queries are lossy with respect to formatting, so
//! findings come back as structured search keys and this module locates them
//! *textually* in the original bytes. Three walkers cover the supported
//! syntaxes:
//!
//! - [`indent`] — nesting by indentation (YAML-family formats)
//! - [`braces`] — nesting by braces/brackets (Terraform, JSON)
//! - [`helm`] — split-marker anchoring plus rendered→original remapping
//!
//! Detection is defensive: a finding is never dropped for lack of a line.
//! When a path cannot be fully resolved the detector reports the last
//! successfully matched ancestor, and when nothing matches at all it reports
//! line 1.

pub mod braces;
pub mod helm;
pub mod indent;

use crate::types::{FileKind, FileMetadata, VulnerabilityLine, VulnerabilityLines};

/// One dotted-path step of a search key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Attribute or block name.
    pub key: String,
    /// Required value for `key=value` steps.
    pub value: Option<String>,
    /// Whether the value was `{{...}}`-wrapped (a rendered expression).
    pub rendered: bool,
}

impl Segment {
    fn bare(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            rendered: false,
        }
    }
}

/// Split a search key into segments.
///
/// Splits on `.` outside `{{...}}` so rendered values may contain dots;
/// `key=value` steps strip the wrapping braces and remember they were there.
pub fn parse_search_key(search_key: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut chars = search_key.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                depth += 1;
                current.push_str("{{");
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                depth = depth.saturating_sub(1);
                current.push_str("}}");
            }
            '.' if depth == 0 => {
                push_segment(&mut segments, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_segment(&mut segments, &current);
    segments
}

fn push_segment(segments: &mut Vec<Segment>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let Some((key, value)) = raw.split_once('=') else {
        segments.push(Segment::bare(raw));
        return;
    };
    let trimmed = value.trim();
    let (value, rendered) = trimmed
        .strip_prefix("{{")
        .and_then(|v| v.strip_suffix("}}"))
        .map_or((trimmed.to_string(), false), |v| (v.to_string(), true));
    segments.push(Segment {
        key: key.to_string(),
        value: Some(value),
        rendered,
    });
}

/// Strip wrapping quotes from a scalar rendered as text.
pub(crate) fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        .unwrap_or(text)
}

/// Resolves search keys to 1-based lines in a file's original source.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDetector;

impl LineDetector {
    /// Create a detector.
    pub const fn new() -> Self {
        Self
    }

    /// Locate `search_key` in `file`, returning the attributed line plus up
    /// to `output_lines` excerpted lines around it.
    pub fn detect(&self, file: &FileMetadata, search_key: &str, output_lines: usize) -> VulnerabilityLines {
        let segments = parse_search_key(search_key);
        if segments.is_empty() || file.original_data.is_empty() {
            return VulnerabilityLines::unknown();
        }

        if file.is_helm() {
            return helm::detect(file, &segments, output_lines);
        }

        let lines: Vec<&str> = file.original_data.lines().collect();
        let hit = match matcher_for(file) {
            Matcher::Braces => braces::find(&lines, &segments, 0, lines.len()),
            Matcher::Indent => indent::find(&lines, &segments, 0, lines.len()),
            Matcher::Flat => flat_find(&lines, &segments),
        };

        match hit {
            Some(index) => from_lines(&lines, index + 1, output_lines),
            None => VulnerabilityLines {
                line: 1,
                vuln_lines: excerpt(&lines, 1, output_lines),
                line_with_vulnerability: lines.first().map(|l| (*l).to_string()).unwrap_or_default(),
            },
        }
    }
}

enum Matcher {
    Braces,
    Indent,
    Flat,
}

fn matcher_for(file: &FileMetadata) -> Matcher {
    match file.kind {
        FileKind::Terraform => Matcher::Braces,
        FileKind::Dockerfile => Matcher::Flat,
        _ => {
            let is_json = file
                .file_name
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json { Matcher::Braces } else { Matcher::Indent }
        }
    }
}

/// Dockerfiles have no nesting; match segments by instruction keyword and
/// argument text, scanning forward.
fn flat_find(lines: &[&str], segments: &[Segment]) -> Option<usize> {
    let mut best = None;
    let mut cursor = 0usize;
    for segment in segments {
        let found = lines[cursor..].iter().position(|line| {
            let trimmed = line.trim();
            let mut tokens = trimmed.splitn(2, char::is_whitespace);
            let keyword = tokens.next().unwrap_or("");
            if !keyword.eq_ignore_ascii_case(&segment.key) {
                return false;
            }
            segment
                .value
                .as_deref()
                .is_none_or(|value| trimmed.contains(value))
        });
        match found {
            Some(offset) => {
                let index = cursor + offset;
                best = Some(index);
                cursor = index + 1;
            }
            None => return best,
        }
    }
    best
}

/// Build the result for a 1-based hit inside `lines`.
pub(crate) fn from_lines(lines: &[&str], line: usize, output_lines: usize) -> VulnerabilityLines {
    VulnerabilityLines {
        line,
        vuln_lines: excerpt(lines, line, output_lines),
        line_with_vulnerability: lines.get(line - 1).map(|l| (*l).to_string()).unwrap_or_default(),
    }
}

/// Up to `output_lines` lines centered on `line` (1-based positions).
pub(crate) fn excerpt(lines: &[&str], line: usize, output_lines: usize) -> Vec<VulnerabilityLine> {
    if output_lines == 0 || lines.is_empty() {
        return Vec::new();
    }
    let half = output_lines / 2;
    let start = line.saturating_sub(half).max(1);
    (start..)
        .take(output_lines)
        .filter_map(|position| {
            lines.get(position - 1).map(|text| VulnerabilityLine {
                position,
                line: (*text).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_paths() {
        let segments = parse_search_key("resource.aws_s3_bucket.logs.acl");
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::bare("resource"));
        assert_eq!(segments[3], Segment::bare("acl"));
    }

    #[test]
    fn rendered_values_keep_their_dots() {
        let segments = parse_search_key(
            "KICS_HELM_ID_0.metadata.name={{RELEASE-NAME-test_helm-test-connection}}.spec.containers",
        );
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0].key, "KICS_HELM_ID_0");
        assert_eq!(segments[2].key, "name");
        assert_eq!(
            segments[2].value.as_deref(),
            Some("RELEASE-NAME-test_helm-test-connection")
        );
        assert!(segments[2].rendered);
        assert_eq!(segments[4].key, "containers");
    }

    #[test]
    fn plain_key_value_is_not_rendered() {
        let segments = parse_search_key("FROM={{alpine:3.19}}.RUN={{apt-get update}}");
        assert_eq!(segments.len(), 2);
        assert!(segments[0].rendered);
        assert_eq!(segments[0].value.as_deref(), Some("alpine:3.19"));

        let segments = parse_search_key("a.b=c");
        assert_eq!(segments[1].value.as_deref(), Some("c"));
        assert!(!segments[1].rendered);
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("x"), "x");
        assert_eq!(unquote("\"x"), "\"x");
    }

    #[test]
    fn dockerfile_segments_match_flat() {
        let file = crate::types::FileMetadata::new(
            "scan",
            "Dockerfile",
            FileKind::Dockerfile,
            serde_json::json!({}),
            "FROM alpine:3.19 AS builder\nRUN apk add curl\nUSER root\n",
        );
        let result = LineDetector::new().detect(&file, "FROM={{builder}}.USER={{root}}", 3);
        assert_eq!(result.line, 3);
        assert_eq!(result.line_with_vulnerability, "USER root");

        // Unmatched tail reports the last matched instruction.
        let partial = LineDetector::new().detect(&file, "FROM={{builder}}.ENTRYPOINT={{sh}}", 3);
        assert_eq!(partial.line, 1);
    }

    #[test]
    fn excerpt_is_bounded_and_positioned() {
        let lines = ["a", "b", "c", "d", "e"];
        let window = excerpt(&lines, 3, 3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].position, 2);
        assert_eq!(window[2].line, "d");

        let top = excerpt(&lines, 1, 3);
        assert_eq!(top[0].position, 1);
    }
}
