//! JSON backend.
//!
//! JSON input is already the canonical document shape; parsing only needs to
//! reject malformed input and lift non-object roots into a single document.

use std::path::Path;

use crate::types::Document;
use crate::{Error, Result};

/// Parse a JSON file into one document.
pub fn parse(filename: &Path, content: &str) -> Result<Vec<Document>> {
    let value: Document = serde_json::from_str(content).map_err(|e| Error::Parse {
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
    fn object_root_parses() {
        let docs = parse(
            Path::new("stack.json"),
            r#"{"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["Resources"]["Bucket"]["Type"], json!("AWS::S3::Bucket"));
    }

    #[test]
    fn numbers_and_booleans_survive() {
        let docs = parse(Path::new("a.json"), r#"{"count": 2, "enabled": false}"#).unwrap();
        assert_eq!(docs[0]["count"], json!(2));
        assert_eq!(docs[0]["enabled"], json!(false));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse(Path::new("bad.json"), "{").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
