//! Line detection for Helm-rendered files.
//!
//! Rendered content carries one `# KICS_HELM_ID_<n>:` marker per
//! sub-document. The search key's first segment names the marker; detection
//! anchors the search window at that marker, walks the rendered text with
//! the indentation walker, then remaps the hit through the file's
//! rendered→original line map so the reported line (and its text) come from
//! the template as written on disk.

use super::{Segment, excerpt, indent};
use crate::resolver::HELM_ID_PREFIX;
use crate::types::{FileMetadata, LinesMap, VulnerabilityLines};

/// Detect a helm search key; `segments[0]` is the split marker id.
pub fn detect(file: &FileMetadata, segments: &[Segment], output_lines: usize) -> VulnerabilityLines {
    let content_lines: Vec<&str> = file.content.lines().collect();
    let original_lines: Vec<&str> = file.original_data.lines().collect();

    let marker = &segments[0].key;
    let Some(ordinal) = split_ordinal(marker) else {
        return VulnerabilityLines::unknown();
    };
    let Some(marker_line) = content_lines
        .iter()
        .position(|line| is_marker(line, Some(marker)))
    else {
        return VulnerabilityLines::unknown();
    };

    let window_end = content_lines[marker_line + 1..]
        .iter()
        .position(|line| is_marker(line, None))
        .map_or(content_lines.len(), |offset| marker_line + 1 + offset);

    let hit = indent::find(&content_lines, &segments[1..], marker_line + 1, window_end);
    let Some(rendered_index) = hit else {
        return VulnerabilityLines {
            line: 1,
            vuln_lines: excerpt(&original_lines, 1, output_lines),
            line_with_vulnerability: original_lines.first().map(|l| (*l).to_string()).unwrap_or_default(),
        };
    };

    let original_line = file
        .id_info
        .get(&ordinal)
        .map_or(rendered_index + 1, |map| remap(map, rendered_index + 1));
    super::from_lines(&original_lines, original_line, output_lines)
}

/// Marker ordinal from its id (`KICS_HELM_ID_3` → 3).
fn split_ordinal(marker: &str) -> Option<usize> {
    marker.rsplit('_').next()?.parse().ok()
}

/// Whether a content line is a split marker; with `id` set, that specific
/// marker.
fn is_marker(line: &str, id: Option<&str>) -> bool {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix("# ") else {
        return false;
    };
    match id {
        Some(id) => rest.trim_end_matches(':') == id,
        None => rest.starts_with(HELM_ID_PREFIX.trim_start_matches("# ")),
    }
}

/// Rendered→original lookup with nearest-anchor fallback for lines the map
/// does not carry (rendering can emit lines with no template counterpart).
fn remap(map: &LinesMap, rendered: usize) -> usize {
    if let Some(&original) = map.get(&rendered) {
        return original;
    }
    map.range(..rendered)
        .next_back()
        .map_or(rendered, |(r, o)| o + (rendered - r))
}
