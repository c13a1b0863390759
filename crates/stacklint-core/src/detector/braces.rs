//! Brace/bracket walker for Terraform and JSON.
//!
//! Nesting follows `{}`/`[]` depth, counted outside string literals and
//! comments. Block-header lines can satisfy several consecutive segments at
//! once (`resource "aws_s3_bucket" "logs" {` consumes `resource`,
//! `aws_s3_bucket`, `logs`), which the indentation walker never needs.
//!
//! Scope and ambiguity behavior mirror [`super::indent`]: unmatched segments
//! retry in the enclosing scope, duplicate candidates for the final segment
//! resolve to the parent line.

use super::{Segment, unquote};

#[derive(Debug, Clone, Copy)]
struct LineDepth {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    start: usize,
    end: usize,
}

/// Walk `lines[window_start..window_end]` for `segments`; same return
/// contract as [`super::indent::find`].
pub fn find(lines: &[&str], segments: &[Segment], window_start: usize, window_end: usize) -> Option<usize> {
    let depths = scan_depths(lines);
    let window_end = window_end.min(lines.len());
    let mut scopes = vec![Scope {
        start: window_start,
        end: window_end,
    }];
    let mut cursor = window_start;
    let mut best: Option<usize> = None;

    let mut index = 0usize;
    while index < segments.len() {
        let segment = &segments[index];
        let is_last = index + 1 == segments.len();
        let scope = *scopes.last()?;
        let candidates = collect_candidates(lines, &depths, segment, cursor.max(scope.start), scope.end);
        if candidates.is_empty() {
            if scopes.len() > 1 {
                scopes.pop();
                continue;
            }
            return best;
        }
        if candidates.len() > 1 && is_last {
            return best;
        }
        let matched = candidates[0];
        best = Some(matched);
        index += 1;

        // A block header can carry the next segments on the same line.
        let mut column = match_column(lines[matched], segment, 0)
            .map_or(0, |(_, end)| end);
        while index < segments.len() {
            match match_column(lines[matched], &segments[index], column) {
                Some((_, end)) if value_holds(lines, matched, &segments[index], end) => {
                    column = end;
                    index += 1;
                }
                _ => break,
            }
        }

        let end = block_end(&depths, matched, scope.end);
        scopes.push(Scope {
            start: matched + 1,
            end,
        });
        cursor = matched + 1;
    }
    best
}

/// Matching lines in `[from, end)` at the shallowest depth any match has.
fn collect_candidates(
    lines: &[&str],
    depths: &[LineDepth],
    segment: &Segment,
    from: usize,
    end: usize,
) -> Vec<usize> {
    let mut matches: Vec<(usize, usize)> = Vec::new();
    for index in from..end.min(lines.len()) {
        let Some((_, col_end)) = match_column(lines[index], segment, 0) else {
            continue;
        };
        if !value_holds(lines, index, segment, col_end) {
            continue;
        }
        matches.push((index, depths[index].start));
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

/// Find `segment.key` on a line as a whole token (bare or quoted), starting
/// at `from` bytes in. Returns the match's byte span.
fn match_column(line: &str, segment: &Segment, from: usize) -> Option<(usize, usize)> {
    let key = segment.key.as_str();
    if key.is_empty() || from >= line.len() {
        return None;
    }
    let mut offset = from;
    while let Some(position) = line[offset..].find(key) {
        let start = offset + position;
        let end = start + key.len();
        let before_ok = start == 0 || !is_ident(line.as_bytes()[start - 1]);
        let after_ok = end >= line.len() || !is_ident(line.as_bytes()[end]);
        if before_ok && after_ok {
            return Some((start, end));
        }
        offset = start + 1;
    }
    None
}

const fn is_ident(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// For `key=value` segments the value must appear after the key on the same
/// line, or on the next non-empty line.
fn value_holds(lines: &[&str], index: usize, segment: &Segment, after: usize) -> bool {
    let Some(value) = segment.value.as_deref() else {
        return true;
    };
    let rest = &lines[index][after.min(lines[index].len())..];
    if rest.contains(value) || unquote(rest).contains(value) {
        return true;
    }
    lines[index + 1..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .is_some_and(|l| l.contains(value))
}

/// First line after `start` where depth falls back to the block's opening
/// level; scope excludes the closing-brace line.
fn block_end(depths: &[LineDepth], start: usize, scope_end: usize) -> usize {
    if depths[start].end <= depths[start].start {
        return start + 1;
    }
    for index in start + 1..scope_end.min(depths.len()) {
        if depths[index].end <= depths[start].start {
            return index;
        }
    }
    scope_end.min(depths.len())
}

/// Per-line depth before/after, ignoring braces inside strings and comments.
fn scan_depths(lines: &[&str]) -> Vec<LineDepth> {
    let mut depths = Vec::with_capacity(lines.len());
    let mut depth = 0usize;
    for line in lines {
        let start = depth;
        let mut in_string = false;
        let mut escaped = false;
        let mut bytes = line.bytes().peekable();
        while let Some(byte) = bytes.next() {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'#' if !in_string => break,
                b'/' if !in_string && bytes.peek() == Some(&b'/') => break,
                b'{' | b'[' if !in_string => depth += 1,
                b'}' | b']' if !in_string => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        depths.push(LineDepth { start, end: depth });
    }
    depths
}
