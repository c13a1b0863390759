//! Document store contract and the in-memory implementation.
//!
//! The core depends on a narrow, append-only persistence seam: save file
//! records and vulnerabilities during a scan, query them back by scan id
//! afterwards. Implementations may persist as JSON, SQL rows, or remote API
//! calls; `Save*` must be internally synchronized because many producer
//! tasks call them concurrently.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{FileMetadata, SeveritySummary, Vulnerability};
use crate::Result;

/// Append-only sink for scan artifacts, queryable by scan id.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist one parsed file record.
    async fn save_file(&self, file: &FileMetadata) -> Result<()>;

    /// Persist a batch of enriched findings.
    async fn save_vulnerabilities(&self, vulns: &[Vulnerability]) -> Result<()>;

    /// All vulnerabilities recorded under a scan id.
    async fn get_vulnerabilities(&self, scan_id: &str) -> Result<Vec<Vulnerability>>;

    /// Severity counts across one or more scan ids.
    async fn get_scan_summary(&self, scan_ids: &[String]) -> Result<SeveritySummary>;
}

/// In-memory [`Storage`] backed by `tokio` locks.
///
/// The default backend for library use and tests. File records keep their
/// `helm_id` so rendered sub-documents sharing a `file_name` stay distinct.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<Vec<FileMetadata>>,
    vulnerabilities: RwLock<Vec<Vulnerability>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All file records recorded under a scan id.
    pub async fn files_for_scan(&self, scan_id: &str) -> Vec<FileMetadata> {
        self.files
            .read()
            .await
            .iter()
            .filter(|f| f.scan_id == scan_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_file(&self, file: &FileMetadata) -> Result<()> {
        debug!(file = %file.file_name.display(), kind = %file.kind, "saving file metadata");
        self.files.write().await.push(file.clone());
        Ok(())
    }

    async fn save_vulnerabilities(&self, vulns: &[Vulnerability]) -> Result<()> {
        debug!(count = vulns.len(), "saving vulnerabilities");
        self.vulnerabilities.write().await.extend_from_slice(vulns);
        Ok(())
    }

    async fn get_vulnerabilities(&self, scan_id: &str) -> Result<Vec<Vulnerability>> {
        Ok(self
            .vulnerabilities
            .read()
            .await
            .iter()
            .filter(|v| v.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn get_scan_summary(&self, scan_ids: &[String]) -> Result<SeveritySummary> {
        let wanted: BTreeSet<&str> = scan_ids.iter().map(String::as_str).collect();
        let matching: Vec<Vulnerability> = self
            .vulnerabilities
            .read()
            .await
            .iter()
            .filter(|v| wanted.contains(v.scan_id.as_str()))
            .cloned()
            .collect();
        Ok(SeveritySummary::from_vulnerabilities(
            scan_ids.to_vec(),
            &matching,
        ))
    }
}
