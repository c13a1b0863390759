//! Chart resolution: render templates into concrete manifests.
//!
//! A chart directory (`Chart.yaml`, optional `values.yaml`, `templates/`)
//! renders into one [`RenderedFile`] per template. Each rendered
//! sub-document gets a `# KICS_HELM_ID_<n>:` marker injected as its first
//! line; ordinals are assigned in sorted template order, then document
//! order, so the same chart on disk always yields the same split ids.
//!
//! Any failure — missing chart metadata, unparsable values, a template the
//! renderer cannot handle — fails the whole chart. A partially rendered
//! chart cannot be inspected safely.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::template::{Engine, RenderContext};
use super::{HELM_ID_PREFIX, RenderedFile, ResolvedOutput};
use crate::types::{IdInfo, LinesMap};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct ChartMeta {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

fn resolve_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::Resolve {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Render every template of the chart at `chart_dir`.
pub fn resolve_chart(chart_dir: &Path) -> Result<ResolvedOutput> {
    let meta_path = chart_dir.join("Chart.yaml");
    let meta_raw = fs::read_to_string(&meta_path)
        .map_err(|e| resolve_error(chart_dir, format!("cannot read Chart.yaml: {e}")))?;
    let meta: ChartMeta = serde_yaml::from_str(&meta_raw)
        .map_err(|e| resolve_error(&meta_path, format!("malformed Chart.yaml: {e}")))?;

    let values_path = chart_dir.join("values.yaml");
    let values = if values_path.is_file() {
        let raw = fs::read_to_string(&values_path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| resolve_error(&values_path, format!("malformed values.yaml: {e}")))?
    } else {
        serde_json::Value::Null
    };

    let ctx = RenderContext {
        values,
        chart_name: meta.name,
        chart_version: meta.version.unwrap_or_else(|| "0.1.0".to_string()),
        release_name: "RELEASE-NAME".to_string(),
    };

    let mut engine = Engine::new();
    let mut templates: Vec<(PathBuf, String, Vec<super::template::Node>)> = Vec::new();
    for path in template_paths(chart_dir) {
        let source = fs::read_to_string(&path)?;
        let body = engine
            .load(&source)
            .map_err(|reason| resolve_error(&path, reason))?;
        templates.push((path, source, body));
    }

    let mut files = Vec::new();
    let mut next_ordinal = 0usize;
    for (path, source, body) in &templates {
        if is_helper(path) {
            continue;
        }
        let rendered = engine
            .render(body, &ctx)
            .map_err(|reason| resolve_error(path, reason))?;
        if rendered.iter().all(|(text, _)| text.trim().is_empty()) {
            debug!(template = %path.display(), "template rendered empty, skipping");
            continue;
        }
        let file = assemble(path, source, &rendered, &mut next_ordinal);
        files.push(file);
    }

    Ok(ResolvedOutput { files })
}

/// Template files in deterministic (sorted) order. `charts/` subdirectories
/// are dependency charts and are not rendered here.
fn template_paths(chart_dir: &Path) -> Vec<PathBuf> {
    let templates = chart_dir.join("templates");
    let mut paths: Vec<PathBuf> = WalkDir::new(&templates)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "tpl")
            )
        })
        .collect();
    paths.sort();
    paths
}

/// Helper templates only carry defines; they never render on their own.
fn is_helper(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('_'))
}

/// Inject markers and build the rendered→original line maps for one
/// rendered template.
fn assemble(
    path: &Path,
    source: &str,
    rendered: &[(String, usize)],
    next_ordinal: &mut usize,
) -> RenderedFile {
    let mut content_lines: Vec<String> = Vec::new();
    let mut split_ids: Vec<String> = Vec::new();
    let mut id_info = IdInfo::new();
    let mut current_map: Option<(usize, LinesMap)> = None;
    let mut document_open = false;

    let mut flush = |current: &mut Option<(usize, LinesMap)>, id_info: &mut IdInfo| {
        if let Some((ordinal, map)) = current.take() {
            id_info.insert(ordinal, map);
        }
    };

    for (text, src) in rendered {
        if text.trim() == "---" {
            flush(&mut current_map, &mut id_info);
            document_open = false;
            content_lines.push(text.clone());
            continue;
        }
        if !document_open && text.trim().is_empty() {
            // Blank space between documents belongs to no split.
            content_lines.push(text.clone());
            continue;
        }
        if !document_open {
            document_open = true;
            let ordinal = *next_ordinal;
            *next_ordinal += 1;
            let id = format!("KICS_HELM_ID_{ordinal}");
            content_lines.push(format!("{HELM_ID_PREFIX}{ordinal}:"));
            split_ids.push(id);
            current_map = Some((ordinal, LinesMap::new()));
        }
        content_lines.push(text.clone());
        if let Some((_, map)) = current_map.as_mut() {
            map.insert(content_lines.len(), *src);
        }
    }
    flush(&mut current_map, &mut id_info);

    let mut content = content_lines.join("\n");
    content.push('\n');
    RenderedFile {
        file_name: path.to_path_buf(),
        content,
        original_data: source.to_string(),
        split_ids,
        id_info,
    }
}
