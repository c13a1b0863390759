//! End-to-end pipeline tests over the on-disk fixtures: a policy bundle
//! (terraform + kubernetes) and a source tree with Terraform files, a
//! Kubernetes manifest, a broken file, and a Helm chart.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stacklint_core::{
    FileKind, FileMetadata, IssueType, MemoryStorage, Parser, PolicyBundle, ScanConfig,
    ScanReport, ScanService, Severity, Storage,
};

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

fn service(storage: Arc<MemoryStorage>) -> ScanService {
    let bundle = PolicyBundle::load(&fixture("policies")).unwrap();
    ScanService::new(ScanConfig::default(), bundle, storage as Arc<dyn Storage>).unwrap()
}

async fn scan_sources(scan_id: &str) -> (ScanReport, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let service = service(Arc::clone(&storage));
    let report = service.scan(scan_id, &fixture("sources")).await.unwrap();
    (report, storage)
}

#[tokio::test]
async fn lambda_service_principal_produces_no_findings() {
    let (report, _) = scan_sources("s-lambda").await;
    assert!(
        !report
            .vulnerabilities
            .iter()
            .any(|v| v.file_name.ends_with("lambda.tf")),
        "service principal must not trigger the wildcard policy"
    );
}

#[tokio::test]
async fn cloudfront_tls_violation_is_reported() {
    let (report, _) = scan_sources("s-cloudfront").await;
    let vuln = report
        .vulnerabilities
        .iter()
        .find(|v| v.file_name.ends_with("cloudfront.tf"))
        .expect("cloudfront finding");

    assert_eq!(vuln.query_name, "CloudFront Without Minimum Protocol TLS 1.2");
    assert_eq!(vuln.severity, Severity::High);
    assert_eq!(vuln.issue_type, IssueType::IncorrectValue);
    assert!(vuln
        .search_key
        .ends_with("viewer_certificate.minimum_protocol_version"));
    assert_eq!(vuln.key_actual_value, "TLSv1");
    assert_eq!(vuln.line, 6);
    assert_eq!(
        vuln.vuln_lines
            .iter()
            .find(|l| l.position == 6)
            .map(|l| l.line.trim_start().starts_with("minimum_protocol_version")),
        Some(true)
    );
}

#[tokio::test]
async fn kubernetes_host_network_is_reported_with_anchor() {
    let (report, _) = scan_sources("s-pod").await;
    let vuln = report
        .vulnerabilities
        .iter()
        .find(|v| v.file_name.ends_with("pod.yaml"))
        .expect("pod finding");

    assert_eq!(vuln.search_key, "metadata.name={{edge-proxy}}.spec.hostNetwork");
    assert_eq!(vuln.line, 6);
    assert_eq!(vuln.key_actual_value, "true");
}

#[tokio::test]
async fn helm_findings_map_back_to_the_template() {
    let (report, storage) = scan_sources("s-helm").await;
    let vuln = report
        .vulnerabilities
        .iter()
        .find(|v| v.file_name.ends_with("test-connection.yaml"))
        .expect("helm finding");

    assert!(vuln.search_key.starts_with("KICS_HELM_ID_0."));
    assert!(vuln
        .search_key
        .contains("metadata.name={{RELEASE-NAME-test_helm-test-connection}}"));
    assert!(vuln.search_key.ends_with("spec.hostNetwork"));
    // Line 8 of the template as written on disk, not of the rendered text.
    assert_eq!(vuln.line, 8);

    let files = storage.files_for_scan("s-helm").await;
    let helm_file = files
        .iter()
        .find(|f| f.kind == FileKind::Helm)
        .expect("helm file record");
    assert_eq!(helm_file.helm_id, "KICS_HELM_ID_0");
    assert!(helm_file.content.starts_with("# KICS_HELM_ID_0:"));
    assert!(!helm_file.original_data.contains("KICS_HELM_ID"));
    assert!(!helm_file.id_info.is_empty());
}

#[tokio::test]
async fn summary_and_storage_queries_agree() {
    let (report, storage) = scan_sources("s-summary").await;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.counters[&Severity::High], 1);
    assert_eq!(report.summary.counters[&Severity::Medium], 2);
    assert_eq!(report.summary.counters[&Severity::Low], 0);

    let stored = storage.get_vulnerabilities("s-summary").await.unwrap();
    assert_eq!(stored.len(), report.vulnerabilities.len());
    let summary = storage
        .get_scan_summary(&["s-summary".to_string()])
        .await
        .unwrap();
    assert_eq!(summary, report.summary);
}

#[tokio::test]
async fn broken_file_degrades_gracefully() {
    // The tree contains broken.yaml; a scan of the same tree without it must
    // not find anything extra.
    let (full_report, _) = scan_sources("s-full").await;
    assert!(full_report.totals.failed >= 1);

    let pruned = tempfile::tempdir().unwrap();
    copy_tree(&fixture("sources"), pruned.path(), Some("broken.yaml"));
    let storage = Arc::new(MemoryStorage::new());
    let service = service(Arc::clone(&storage));
    let pruned_report = service.scan("s-pruned", pruned.path()).await.unwrap();

    assert!(full_report.vulnerabilities.len() >= pruned_report.vulnerabilities.len());
    assert_eq!(
        keys(&full_report),
        keys(&pruned_report),
        "the broken file must not change what the healthy files report"
    );
}

#[tokio::test]
async fn repeated_scans_are_deterministic() {
    let (first, _) = scan_sources("s-first").await;
    let (second, _) = scan_sources("s-second").await;
    assert_eq!(keys(&first), keys(&second));
}

#[tokio::test]
async fn policy_fixtures_self_test() {
    let bundle = PolicyBundle::load(&fixture("policies")).unwrap();
    let parser = Parser::new();
    let mut checked = 0usize;

    for policy in bundle.policies() {
        for fixture_path in &policy.fixtures {
            let source = fs::read_to_string(fixture_path).unwrap();
            let parsed = parser.parse(fixture_path, &source).unwrap();
            let file = FileMetadata::new(
                "self-test",
                fixture_path.clone(),
                parsed.kind,
                parsed.documents.into_iter().next().unwrap(),
                source,
            );
            let findings = stacklint_core::engine::eval::evaluate(policy, &file).unwrap();

            let name = fixture_path.file_stem().unwrap().to_string_lossy();
            if name.starts_with("positive") {
                assert!(
                    !findings.is_empty(),
                    "{} expected findings from {}",
                    policy.metadata.id,
                    fixture_path.display()
                );
            } else {
                assert!(
                    findings.is_empty(),
                    "{} expected no findings from {}",
                    policy.metadata.id,
                    fixture_path.display()
                );
            }
            checked += 1;
        }
    }
    assert_eq!(checked, 6);
}

fn keys(report: &ScanReport) -> Vec<(String, usize, String, String)> {
    report
        .vulnerabilities
        .iter()
        .map(|v| {
            let name = v
                .file_name
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (name, v.line, v.query_id.clone(), v.search_key.clone())
        })
        .collect()
}

fn copy_tree(from: &Path, to: &Path, skip_file: Option<&str>) {
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_tree(&entry.path(), &target, skip_file);
        } else {
            if skip_file.is_some_and(|skip| entry.file_name().to_string_lossy() == skip) {
                continue;
            }
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}
