//! Scan orchestration.
//!
//! [`ScanService`] drives the pipeline for one scan: enumerate sources,
//! parse (or resolve-then-parse) each into file records, store them, run the
//! inspector over the collected list, store the findings, and report.
//!
//! Per-file failures (oversized, unparseable, unrenderable) are logged,
//! counted, and skipped; the scan completes as long as the walk, the
//! inspection, and storage succeed. Cancellation is cooperative through
//! [`ScanContext`], checked at every suspension point.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::engine::{Inspector, PolicyBundle};
use crate::parser::Parser;
use crate::provider::{FileSystemProvider, SourceSink};
use crate::resolver::Resolver;
use crate::storage::Storage;
use crate::tracker::{CounterTracker, Tracker, TrackerTotals};
use crate::types::{FileKind, FileMetadata, SeveritySummary, Vulnerability};
use crate::{Error, Result};

/// Shared cancellation flag for one scan.
///
/// Cloning shares the flag. In-flight work stops at its next suspension
/// point once [`ScanContext::cancel`] is called; partial results may already
/// be written, and the scan returns [`Error::Canceled`].
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancelled: Arc<AtomicBool>,
}

impl ScanContext {
    /// A fresh, un-cancelled context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Error out if cancellation was requested.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Everything one scan produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// The scan's group key.
    pub scan_id: String,
    /// When the scan finished.
    pub finished_at: chrono::DateTime<chrono::Utc>,
    /// Canonically sorted findings.
    pub vulnerabilities: Vec<Vulnerability>,
    /// Per-severity counts.
    pub summary: SeveritySummary,
    /// Progress counters at completion.
    pub totals: TrackerTotals,
}

/// Orchestrates the scan pipeline.
pub struct ScanService {
    config: ScanConfig,
    parser: Parser,
    resolver: Resolver,
    inspector: Inspector,
    storage: Arc<dyn Storage>,
    tracker: Arc<CounterTracker>,
}

impl ScanService {
    /// Build a service from a validated config, a loaded bundle, and a
    /// storage backend.
    pub fn new(config: ScanConfig, bundle: PolicyBundle, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;
        let inspector = Inspector::new(bundle, &config);
        Ok(Self {
            config,
            parser: Parser::new(),
            resolver: Resolver::new(),
            inspector,
            storage,
            tracker: Arc::new(CounterTracker::new()),
        })
    }

    /// Progress counters, live during a scan.
    pub fn tracker(&self) -> &CounterTracker {
        &self.tracker
    }

    /// Run one scan over `root`.
    pub async fn scan(&self, scan_id: &str, root: &Path) -> Result<ScanReport> {
        self.scan_with_context(scan_id, root, &ScanContext::new()).await
    }

    /// Run one scan with an externally controlled cancellation context.
    pub async fn scan_with_context(
        &self,
        scan_id: &str,
        root: &Path,
        ctx: &ScanContext,
    ) -> Result<ScanReport> {
        info!(scan_id, root = %root.display(), "starting scan");
        let provider = FileSystemProvider::new(root, &self.config);
        let sink = ScanSink {
            service: self,
            scan_id,
            files: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
            ctx,
        };

        let walk = provider.get_sources(ctx, &sink).await;
        if let Some(fatal) = sink.fatal.lock().await.take() {
            return Err(fatal);
        }
        walk?;

        let files = sink.files.into_inner();
        debug!(files = files.len(), "enumeration complete");

        let vulnerabilities = self
            .inspector
            .inspect(&files, ctx, self.tracker.as_ref())
            .await?;
        self.storage
            .save_vulnerabilities(&vulnerabilities)
            .await?;

        let summary = SeveritySummary::from_vulnerabilities(vec![scan_id.to_string()], &vulnerabilities);
        let totals = self.tracker.totals();
        info!(
            scan_id,
            findings = vulnerabilities.len(),
            files = totals.found,
            "scan complete"
        );
        Ok(ScanReport {
            scan_id: scan_id.to_string(),
            finished_at: chrono::Utc::now(),
            vulnerabilities,
            summary,
            totals,
        })
    }

    /// Read a file in fixed-size chunks, failing as soon as the cumulative
    /// size crosses the cap; never buffers more than `cap + chunk` bytes.
    async fn read_bounded(&self, path: &Path) -> Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut content: Vec<u8> = Vec::new();
        let mut buffer = vec![0u8; self.config.chunk_size];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            content.extend_from_slice(&buffer[..read]);
            if content.len() > self.config.max_file_size {
                return Err(Error::FileTooLarge {
                    path: path.to_path_buf(),
                    limit: self.config.max_file_size,
                });
            }
        }
        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}

/// The service's side of the provider seam: parse and resolve sinks that
/// append to the scan's in-memory file list.
struct ScanSink<'a> {
    service: &'a ScanService,
    scan_id: &'a str,
    files: Mutex<Vec<FileMetadata>>,
    /// Storage failures are fatal even though sink errors are otherwise
    /// isolated; the first one is parked here and the walk cancelled.
    fatal: Mutex<Option<Error>>,
    ctx: &'a ScanContext,
}

impl ScanSink<'_> {
    async fn store(&self, file: FileMetadata) -> Result<()> {
        if let Err(err) = self.service.storage.save_file(&file).await {
            *self.fatal.lock().await = Some(err);
            self.ctx.cancel();
            return Err(Error::Storage("save_file failed".into()));
        }
        self.files.lock().await.push(file);
        Ok(())
    }
}

#[async_trait]
impl SourceSink for ScanSink<'_> {
    async fn parse(&self, path: &Path) -> Result<()> {
        self.service.tracker.track_file_found();
        let content = match self.service.read_bounded(path).await {
            Ok(content) => content,
            Err(err) => {
                self.service.tracker.track_file_failed();
                return Err(err);
            }
        };
        let parsed = match self.service.parser.parse(path, &content) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.service.tracker.track_file_failed();
                return Err(err);
            }
        };
        self.service.tracker.track_file_parse();
        for document in parsed.documents {
            let file = FileMetadata::new(self.scan_id, path, parsed.kind, document, content.clone());
            self.store(file).await?;
        }
        Ok(())
    }

    async fn resolve(&self, path: &Path) -> Result<()> {
        self.service.tracker.track_file_found();
        let output = match self.service.resolver.resolve(path, FileKind::Helm) {
            Ok(output) => output,
            Err(err) => {
                self.service.tracker.track_file_failed();
                return Err(err);
            }
        };
        for rendered in output.files {
            let parsed = match self.service.parser.parse(&rendered.file_name, &rendered.content) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.service.tracker.track_file_failed();
                    warn!(
                        template = %rendered.file_name.display(),
                        error = %err,
                        "rendered template did not parse"
                    );
                    continue;
                }
            };
            self.service.tracker.track_file_parse();
            for (index, document) in parsed.documents.into_iter().enumerate() {
                let Some(split_id) = rendered.split_ids.get(index) else {
                    warn!(
                        template = %rendered.file_name.display(),
                        index,
                        "rendered document without a split id"
                    );
                    continue;
                };
                let file = FileMetadata::new(
                    self.scan_id,
                    &rendered.file_name,
                    FileKind::Helm,
                    document,
                    rendered.original_data.clone(),
                )
                .with_resolved(rendered.content.clone(), split_id, rendered.id_info.clone());
                self.store(file).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::fs;

    fn empty_bundle() -> PolicyBundle {
        PolicyBundle::default()
    }

    fn service_with(config: ScanConfig) -> ScanService {
        ScanService::new(config, empty_bundle(), Arc::new(MemoryStorage::new())).unwrap()
    }

    #[tokio::test]
    async fn bounded_reader_rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.yaml");
        fs::write(&path, "x".repeat(100)).unwrap();

        let config = ScanConfig {
            chunk_size: 16,
            max_file_size: 64,
            ..ScanConfig::default()
        };
        let service = service_with(config);
        let err = service.read_bounded(&path).await.unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { limit: 64, .. }));
    }

    #[tokio::test]
    async fn bounded_reader_accepts_files_at_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.yaml");
        fs::write(&path, "y".repeat(64)).unwrap();

        let config = ScanConfig {
            chunk_size: 16,
            max_file_size: 64,
            ..ScanConfig::default()
        };
        let service = service_with(config);
        let content = service.read_bounded(&path).await.unwrap();
        assert_eq!(content.len(), 64);
    }

    #[tokio::test]
    async fn oversized_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.yaml"), "a: 1\n".repeat(1000)).unwrap();
        fs::write(dir.path().join("small.yaml"), "apiVersion: v1\nkind: Pod\nmetadata:\n  name: x\n").unwrap();

        let config = ScanConfig {
            chunk_size: 64,
            max_file_size: 128,
            ..ScanConfig::default()
        };
        let storage = Arc::new(MemoryStorage::new());
        let service =
            ScanService::new(config, empty_bundle(), Arc::clone(&storage) as Arc<dyn Storage>)
                .unwrap();
        let report = service.scan("s1", dir.path()).await.unwrap();

        assert_eq!(report.totals.found, 2);
        assert_eq!(report.totals.parsed, 1);
        assert_eq!(report.totals.failed, 1);
        let files = storage.files_for_scan("s1").await;
        assert_eq!(files.len(), 1);
        assert!(files[0].file_name.ends_with("small.yaml"));
    }

    #[tokio::test]
    async fn malformed_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.yaml"), "a: [unclosed\n").unwrap();
        fs::write(dir.path().join("good.tf"), "resource \"aws_s3_bucket\" \"b\" {\n  acl = \"private\"\n}\n").unwrap();

        let service = service_with(ScanConfig::default());
        let report = service.scan("s1", dir.path()).await.unwrap();
        assert_eq!(report.totals.parsed, 1);
        assert_eq!(report.totals.failed, 1);
        assert!(report.vulnerabilities.is_empty());
    }

    #[tokio::test]
    async fn multi_document_files_store_one_record_each() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pods.yaml"),
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: Pod\nmetadata:\n  name: b\n",
        )
        .unwrap();

        let storage = Arc::new(MemoryStorage::new());
        let service = ScanService::new(
            ScanConfig::default(),
            empty_bundle(),
            Arc::clone(&storage) as Arc<dyn Storage>,
        )
        .unwrap();
        service.scan("s1", dir.path()).await.unwrap();

        let files = storage.files_for_scan("s1").await;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.kind == FileKind::Kubernetes));
        assert_ne!(files[0].id, files[1].id);
    }

    #[tokio::test]
    async fn cancelled_scan_errors_out() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.tf"), "resource \"x\" \"y\" {}\n").unwrap();

        let service = service_with(ScanConfig::default());
        let ctx = ScanContext::new();
        ctx.cancel();
        let result = service.scan_with_context("s1", dir.path(), &ctx).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
