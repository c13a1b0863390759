//! Source discovery: walking input roots and routing files to sinks.
//!
//! [`FileSystemProvider`] walks a root path and classifies every entry:
//! directly-parseable artifacts go to [`SourceSink::parse`], template-like
//! artifacts that need rendering first (chart directories) go to
//! [`SourceSink::resolve`]. A chart owns everything under it, so its
//! `templates/` files are not *also* routed to parse.
//!
//! Sink failures are logged and skipped: one rotten file never poisons the
//! walk. An unreadable root is fatal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::parser::is_dockerfile;
use crate::resolver::Resolver;
use crate::service::ScanContext;
use crate::{Error, Result};

/// Receives discovered sources. Implementations must tolerate concurrent
/// invocation.
#[async_trait]
pub trait SourceSink: Send + Sync {
    /// A directly-parseable file was found.
    async fn parse(&self, path: &Path) -> Result<()>;
    /// A template-like artifact needing resolution was found.
    async fn resolve(&self, path: &Path) -> Result<()>;
}

/// Walks a filesystem root and feeds a [`SourceSink`].
#[derive(Debug, Clone)]
pub struct FileSystemProvider {
    root: PathBuf,
    extensions: Vec<String>,
    exclude: Vec<String>,
}

impl FileSystemProvider {
    /// Create a provider for one root.
    pub fn new(root: impl Into<PathBuf>, config: &ScanConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config.extensions.clone(),
            exclude: config.exclude.clone(),
        }
    }

    /// The root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate the root, routing every artifact to the sink.
    ///
    /// Deterministic: entries are visited in sorted order. Hidden
    /// directories and excluded paths are skipped without descending.
    pub async fn get_sources(&self, ctx: &ScanContext, sink: &dyn SourceSink) -> Result<()> {
        if !self.root.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("scan root '{}' does not exist", self.root.display()),
            )));
        }

        let mut walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            ctx.ensure_active()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(Error::Io(std::io::Error::other(err)));
                    }
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();

            if entry.depth() > 0 && (is_hidden(path) || self.is_excluded(path)) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            if entry.file_type().is_dir() {
                if Resolver::detects(path).is_some() {
                    debug!(chart = %path.display(), "routing chart to resolver");
                    if let Err(err) = sink.resolve(path).await {
                        warn!(path = %path.display(), error = %err, "resolve sink failed");
                    }
                    // The chart owns its templates; don't re-discover them.
                    walker.skip_current_dir();
                }
                continue;
            }

            if self.is_supported(path) {
                if let Err(err) = sink.parse(path).await {
                    warn!(path = %path.display(), error = %err, "parse sink failed");
                }
            }
        }
        Ok(())
    }

    fn is_supported(&self, path: &Path) -> bool {
        if is_dockerfile(path) {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.exclude.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
