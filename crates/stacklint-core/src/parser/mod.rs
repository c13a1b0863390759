//! Multi-format parsing into the canonical document model.
//!
//! [`Parser::parse`] dispatches on file name and content, converting raw text
//! into one-or-more [`Document`] trees and reporting the detected
//! [`FileKind`]. Backends:
//!
//! - [`yaml`] — YAML multi-document streams (Kubernetes, CloudFormation,
//!   Ansible, rendered Helm, generic YAML)
//! - [`json`] — JSON (CloudFormation, generic JSON)
//! - [`terraform`] — HCL bodies
//! - [`dockerfile`] — Dockerfile instruction lists
//!
//! Scalar types survive the conversion: a YAML `false` reaches the policy
//! engine as a boolean, not the string `"false"`. Comments are tolerated
//! everywhere; the Helm split markers the resolver injects are comments and
//! stay visible only in the file text, never in the documents.
//!
//! A single file may yield several documents (YAML streams). Formats with
//! includes (Terraform modules, nested stacks) yield their own top-level
//! documents only; recursive resolution belongs to the resolver.

pub mod dockerfile;
pub mod json;
pub mod terraform;
pub mod yaml;

use std::path::Path;

use crate::types::{Document, FileKind};
use crate::{Error, Result};

/// Result of parsing one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    /// Canonical documents, in source order.
    pub documents: Vec<Document>,
    /// Detected artifact family for the whole file.
    pub kind: FileKind,
}

/// Format dispatcher.
///
/// Stateless and cheap to clone; one instance serves concurrent callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser;

impl Parser {
    /// Create a parser.
    pub const fn new() -> Self {
        Self
    }

    /// Parse a file into documents plus its detected kind.
    ///
    /// Unparseable input returns [`Error::Parse`]; callers skip the file and
    /// keep scanning.
    pub fn parse(&self, filename: &Path, content: &str) -> Result<ParsedFile> {
        if is_dockerfile(filename) {
            let documents = dockerfile::parse(filename, content)?;
            return Ok(ParsedFile {
                documents,
                kind: FileKind::Dockerfile,
            });
        }

        match extension(filename).as_deref() {
            Some("tf") => {
                let documents = terraform::parse(filename, content)?;
                Ok(ParsedFile {
                    documents,
                    kind: FileKind::Terraform,
                })
            }
            Some("json") => {
                let documents = json::parse(filename, content)?;
                let kind = sniff_documents(&documents);
                Ok(ParsedFile { documents, kind })
            }
            Some("yaml" | "yml") => {
                let documents = yaml::parse(filename, content)?;
                let kind = sniff_documents(&documents);
                Ok(ParsedFile { documents, kind })
            }
            _ => Err(Error::Parse {
                file: filename.to_path_buf(),
                reason: "unsupported file format".into(),
            }),
        }
    }
}

/// Lowercased extension, if any.
fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Dockerfiles are recognized by name, not extension: `Dockerfile`,
/// `Dockerfile.dev`, `build.dockerfile`.
pub fn is_dockerfile(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    name == "dockerfile" || name.starts_with("dockerfile.") || name.ends_with(".dockerfile")
}

/// Classify a file from its parsed documents. The first recognized document
/// decides; mixed streams keep that kind for the whole file.
fn sniff_documents(documents: &[Document]) -> FileKind {
    for doc in documents {
        let kind = sniff_document(doc);
        if kind != FileKind::Common {
            return kind;
        }
    }
    FileKind::Common
}

/// Classify a single document by its structure.
pub fn sniff_document(doc: &Document) -> FileKind {
    let Some(map) = doc.as_object() else {
        return FileKind::Common;
    };
    if map.contains_key("apiVersion") && map.contains_key("kind") {
        return FileKind::Kubernetes;
    }
    if map.get("Resources").is_some_and(Document::is_object)
        || map.contains_key("AWSTemplateFormatVersion")
    {
        return FileKind::CloudFormation;
    }
    if map.get("playbooks").is_some_and(yaml::is_playbook_list) {
        return FileKind::Ansible;
    }
    FileKind::Common
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dockerfile_names_are_recognized() {
        assert!(is_dockerfile(Path::new("Dockerfile")));
        assert!(is_dockerfile(Path::new("sub/dir/Dockerfile")));
        assert!(is_dockerfile(Path::new("Dockerfile.dev")));
        assert!(is_dockerfile(Path::new("build.dockerfile")));
        assert!(!is_dockerfile(Path::new("dockerfile.md")));
        assert!(!is_dockerfile(Path::new("main.tf")));
    }

    #[test]
    fn kubernetes_manifest_is_sniffed() {
        let parsed = Parser::new()
            .parse(
                Path::new("pod.yaml"),
                "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\n",
            )
            .unwrap();
        assert_eq!(parsed.kind, FileKind::Kubernetes);
        assert_eq!(parsed.documents.len(), 1);
    }

    #[test]
    fn cloudformation_yaml_is_sniffed() {
        let parsed = Parser::new()
            .parse(
                Path::new("stack.yaml"),
                "AWSTemplateFormatVersion: '2010-09-09'\nResources:\n  Bucket:\n    Type: AWS::S3::Bucket\n",
            )
            .unwrap();
        assert_eq!(parsed.kind, FileKind::CloudFormation);
    }

    #[test]
    fn plain_yaml_is_common() {
        let parsed = Parser::new()
            .parse(Path::new("values.yaml"), "replicaCount: 1\nimage: nginx\n")
            .unwrap();
        assert_eq!(parsed.kind, FileKind::Common);
    }

    #[test]
    fn unknown_extension_is_a_parse_error() {
        let err = Parser::new()
            .parse(Path::new("notes.txt"), "hello")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { file, .. } if file == PathBuf::from("notes.txt")));
    }
}
