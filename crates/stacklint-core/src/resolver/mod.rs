//! Pre-processing of template-like artifacts into parseable files.
//!
//! Some inputs cannot be parsed as found on disk; charts must be rendered
//! first. The resolver turns such an input into a set of [`RenderedFile`]s
//! carrying both the rendered text and the metadata the line detector needs
//! to report findings against the *original* template: the injected split
//! markers and the rendered→original line maps.
//!
//! Resolution is deterministic: the same chart on disk produces the same
//! split ids in the same order on every run.

pub mod helm;
mod template;

use std::path::{Path, PathBuf};

use crate::types::{FileKind, IdInfo};
use crate::Result;

/// Marker prefix injected as the first line of every rendered sub-document.
///
/// Wire-level contract with the line detector and with stored search keys;
/// changing it is a breaking change.
pub const HELM_ID_PREFIX: &str = "# KICS_HELM_ID_";

/// One rendered template file.
///
/// `file_name` is the original template path on disk, not a rendered
/// artifact path. A template that renders several YAML documents carries one
/// split id per sub-document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Original template path.
    pub file_name: PathBuf,
    /// Rendered text, markers included.
    pub content: String,
    /// Untouched template text.
    pub original_data: String,
    /// Split marker ids, one per rendered sub-document.
    pub split_ids: Vec<String>,
    /// Rendered→original line maps keyed by split ordinal.
    pub id_info: IdInfo,
}

/// Everything a resolve call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOutput {
    /// Rendered files, in deterministic order.
    pub files: Vec<RenderedFile>,
}

/// Dispatches resolution by kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver;

impl Resolver {
    /// Create a resolver.
    pub const fn new() -> Self {
        Self
    }

    /// Whether a directory needs resolution before parsing.
    pub fn detects(path: &Path) -> Option<FileKind> {
        if path.is_dir() && path.join("Chart.yaml").is_file() {
            Some(FileKind::Helm)
        } else {
            None
        }
    }

    /// Render `path` according to `kind`.
    ///
    /// A broken chart fails as a whole: partial rendering errors are fatal
    /// for the chart because the remainder cannot be trusted.
    pub fn resolve(&self, path: &Path, kind: FileKind) -> Result<ResolvedOutput> {
        match kind {
            FileKind::Helm => helm::resolve_chart(path),
            _ => Ok(ResolvedOutput::default()),
        }
    }
}
