//! The `scan` command: run the core pipeline and report.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use stacklint_core::{
    MemoryStorage, PolicyBundle, ScanConfig, ScanReport, ScanService, Severity, Storage,
};
use tracing::info;
use uuid::Uuid;

use crate::cli::{Format, ScanArgs};

/// Run a scan over every requested root and print the results.
///
/// Returns the total number of findings so the caller can pick an exit code.
pub async fn execute(args: ScanArgs) -> Result<usize> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load_from(path)
            .with_context(|| format!("loading config from '{}'", path.display()))?,
        None => ScanConfig::default(),
    };
    config.exclude.extend(args.exclude.iter().cloned());

    let bundle = PolicyBundle::load(&args.policies)
        .with_context(|| format!("loading policies from '{}'", args.policies.display()))?;
    info!(policies = bundle.len(), "policy bundle ready");

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let service = ScanService::new(config, bundle, storage)?;

    let mut reports = Vec::new();
    for root in &args.paths {
        let scan_id = Uuid::new_v4().to_string();
        let report = service
            .scan(&scan_id, root)
            .await
            .with_context(|| format!("scanning '{}'", root.display()))?;
        reports.push(report);
    }

    if let Some(path) = &args.report_path {
        let payload = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, payload)
            .with_context(|| format!("writing report to '{}'", path.display()))?;
    }

    let total = reports.iter().map(|r| r.vulnerabilities.len()).sum();
    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => {
            for (root, report) in args.paths.iter().zip(&reports) {
                print_text(root, report);
            }
        }
    }
    Ok(total)
}

fn print_text(root: &Path, report: &ScanReport) {
    println!("Scanned {}", root.display());
    println!(
        "  files: {} found, {} parsed, {} failed",
        report.totals.found, report.totals.parsed, report.totals.failed
    );
    for vuln in &report.vulnerabilities {
        println!(
            "  {}:{} [{}] {} ({})",
            vuln.file_name.display(),
            vuln.line,
            vuln.severity,
            vuln.query_name,
            vuln.category
        );
    }
    let counters = &report.summary.counters;
    println!(
        "  findings: {} total (HIGH: {}, MEDIUM: {}, LOW: {}, INFO: {})",
        report.summary.total,
        counters.get(&Severity::High).copied().unwrap_or(0),
        counters.get(&Severity::Medium).copied().unwrap_or(0),
        counters.get(&Severity::Low).copied().unwrap_or(0),
        counters.get(&Severity::Info).copied().unwrap_or(0),
    );
}
