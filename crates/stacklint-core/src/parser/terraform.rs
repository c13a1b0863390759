//! Terraform backend: HCL bodies into canonical documents.
//!
//! The HCL body maps onto the document tree by block nesting: a labeled
//! block `resource "aws_s3_bucket" "logs" { ... }` becomes
//! `{"resource": {"aws_s3_bucket": {"logs": {...}}}}`, attribute values keep
//! their HCL types, and unresolved interpolations stay as `"${...}"` strings.
//! Module sources are left as written; following them is the resolver's job,
//! not the parser's.

use std::path::Path;

use crate::types::Document;
use crate::{Error, Result};

/// Parse one Terraform file into one document.
pub fn parse(filename: &Path, content: &str) -> Result<Vec<Document>> {
    let value: Document = hcl::from_str(content).map_err(|e| Error::Parse {
        file: filename.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(vec![value])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labeled_blocks_nest() {
        let docs = parse(
            Path::new("main.tf"),
            r#"
resource "aws_lambda_permission" "allow_cloudwatch" {
  statement_id = "AllowExecutionFromCloudWatch"
  principal    = "events.amazonaws.com"
}
"#,
        )
        .unwrap();
        let block = &docs[0]["resource"]["aws_lambda_permission"]["allow_cloudwatch"];
        assert_eq!(block["principal"], json!("events.amazonaws.com"));
    }

    #[test]
    fn nested_blocks_and_types_survive() {
        let docs = parse(
            Path::new("cdn.tf"),
            r#"
resource "aws_cloudfront_distribution" "cdn" {
  enabled = true

  viewer_certificate {
    cloudfront_default_certificate = false
    minimum_protocol_version       = "TLSv1"
  }
}
"#,
        )
        .unwrap();
        let cert = &docs[0]["resource"]["aws_cloudfront_distribution"]["cdn"]["viewer_certificate"];
        assert_eq!(cert["cloudfront_default_certificate"], json!(false));
        assert_eq!(cert["minimum_protocol_version"], json!("TLSv1"));
        assert_eq!(
            docs[0]["resource"]["aws_cloudfront_distribution"]["cdn"]["enabled"],
            json!(true)
        );
    }

    #[test]
    fn interpolations_stay_textual() {
        let docs = parse(
            Path::new("main.tf"),
            "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"${var.prefix}-logs\"\n}\n",
        )
        .unwrap();
        let bucket = &docs[0]["resource"]["aws_s3_bucket"]["b"]["bucket"];
        assert!(bucket.as_str().is_some_and(|s| s.contains("var.prefix")));
    }

    #[test]
    fn malformed_hcl_is_a_parse_error() {
        let err = parse(Path::new("bad.tf"), "resource \"x\" {").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
