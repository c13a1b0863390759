//! Indentation walker for YAML-family formats.
//!
//! Nesting follows leading whitespace. The walker keeps a stack of scopes
//! (the block opened by each matched segment); a segment that cannot be
//! found in the current scope retries in the enclosing scope before the
//! walk gives up, which is what lets anchor steps like
//! `metadata.name={{x}}` be followed by a sibling step (`spec`) rather than
//! a child.
//!
//! Ambiguity rule: two or more candidates at the same depth for the *final*
//! segment cannot be told apart, so the walk resolves to the parent line.
//! Intermediate duplicates descend into the first occurrence.

use super::{Segment, unquote};

#[derive(Debug, Clone, Copy)]
struct Scope {
    start: usize,
    end: usize,
}

/// Walk `lines[window_start..window_end]` for `segments`.
///
/// Returns the 0-based index of the matched line, the last matched ancestor
/// on a partial or ambiguous walk, or `None` when not even the first segment
/// matched.
pub fn find(lines: &[&str], segments: &[Segment], window_start: usize, window_end: usize) -> Option<usize> {
    let mut scopes = vec![Scope {
        start: window_start,
        end: window_end.min(lines.len()),
    }];
    let mut cursor = window_start;
    let mut best: Option<usize> = None;

    for (position, segment) in segments.iter().enumerate() {
        let is_last = position + 1 == segments.len();
        loop {
            let scope = *scopes.last()?;
            let candidates = collect_candidates(lines, segment, cursor.max(scope.start), scope.end);
            if candidates.is_empty() {
                if scopes.len() > 1 {
                    scopes.pop();
                    continue;
                }
                return best;
            }
            if candidates.len() > 1 && is_last {
                // Duplicate siblings for the terminal step: report the
                // enclosing scope instead of guessing.
                return best;
            }
            let matched = candidates[0];
            best = Some(matched);
            let end = block_end(lines, matched, scope.end);
            scopes.push(Scope {
                start: matched + 1,
                end,
            });
            cursor = matched + 1;
            break;
        }
    }
    best
}

/// Matching lines in `[from, end)` at the shallowest indentation any match
/// has in that range.
fn collect_candidates(lines: &[&str], segment: &Segment, from: usize, end: usize) -> Vec<usize> {
    let mut matches: Vec<(usize, usize)> = Vec::new();
    for index in from..end.min(lines.len()) {
        if let Some(depth) = line_matches(lines, index, segment) {
            matches.push((index, depth));
        }
    }
    let Some(min_depth) = matches.iter().map(|(_, d)| *d).min() else {
        return Vec::new();
    };
    matches
        .into_iter()
        .filter(|(_, depth)| *depth == min_depth)
        .map(|(index, _)| index)
        .collect()
}

/// Whether `lines[index]` carries `segment`'s key (and value, for `key=value`
/// steps); returns the line's indentation depth on match.
fn line_matches(lines: &[&str], index: usize, segment: &Segment) -> Option<usize> {
    let raw = lines[index];
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let depth = raw.len() - trimmed.len();

    // Sequence items carry their key after the dash.
    let mut body = trimmed;
    while let Some(stripped) = body.strip_prefix("- ") {
        body = stripped;
    }

    let (key, rest) = body.split_once(':').map_or((body, ""), |(k, r)| (k, r));
    if unquote(key.trim()) != segment.key {
        return None;
    }

    if let Some(value) = segment.value.as_deref() {
        let inline = unquote(rest.trim());
        if !inline.is_empty() {
            if !inline.contains(value) {
                return None;
            }
        } else {
            // Value continues on the following non-empty line.
            let continued = lines[index + 1..]
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty() && !l.starts_with('#'));
            if !continued.is_some_and(|l| l.contains(value)) {
                return None;
            }
        }
    }
    Some(depth)
}

/// First line after `start` that closes the block opened there: non-empty,
/// non-comment, indented at or above the block line.
fn block_end(lines: &[&str], start: usize, scope_end: usize) -> usize {
    let base = indent_of(lines[start]);
    for index in start + 1..scope_end.min(lines.len()) {
        let trimmed = lines[index].trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if indent_of(lines[index]) <= base {
            return index;
        }
    }
    scope_end.min(lines.len())
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::parse_search_key;

    const POD: &str = "\
apiVersion: v1
kind: Pod
metadata:
  name: wget-test
  labels:
    app: test
spec:
  containers:
    - name: wget
      image: busybox
  restartPolicy: Never
";

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn walks_nested_path() {
        let lines = lines(POD);
        let segments = parse_search_key("spec.containers");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(7));
    }

    #[test]
    fn anchor_then_sibling() {
        let lines = lines(POD);
        let segments = parse_search_key("metadata.name={{wget-test}}.spec.containers");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(7));
    }

    #[test]
    fn value_mismatch_does_not_anchor() {
        let lines = lines(POD);
        let segments = parse_search_key("metadata.name={{other-pod}}");
        // `metadata` matched, the anchor did not.
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(2));
    }

    #[test]
    fn duplicate_terminal_falls_back_to_parent() {
        let text = "\
spec:
  containers:
    - name: a
  containers:
    - name: b
";
        let lines: Vec<&str> = text.lines().collect();
        let segments = parse_search_key("spec.containers");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(0));
    }

    #[test]
    fn sequence_item_keys_match() {
        let lines = lines(POD);
        let segments = parse_search_key("spec.containers.image");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(9));
    }

    #[test]
    fn missing_path_reports_last_ancestor() {
        let lines = lines(POD);
        let segments = parse_search_key("spec.volumes");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(6));
    }

    #[test]
    fn nothing_matched_is_none() {
        let lines = lines(POD);
        let segments = parse_search_key("stages");
        assert_eq!(find(&lines, &segments, 0, lines.len()), None);
    }

    #[test]
    fn value_on_continuation_line() {
        let text = "\
metadata:
  name:
    wget-test
";
        let lines: Vec<&str> = text.lines().collect();
        let segments = parse_search_key("metadata.name={{wget-test}}");
        assert_eq!(find(&lines, &segments, 0, lines.len()), Some(1));
    }
}
