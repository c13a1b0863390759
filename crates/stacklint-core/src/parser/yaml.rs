//! YAML backend: multi-document streams into canonical documents.
//!
//! Documents are read with `serde_yaml` and converted into the shared
//! [`Document`] shape. Two canonicalizations happen on the way:
//!
//! - CloudFormation short-form intrinsics (`!Ref x`, `!GetAtt a.b`,
//!   `!Sub ...`) become single-key mappings (`{"Ref": "x"}`,
//!   `{"Fn::GetAtt": "a.b"}`) so policies query one shape;
//! - Ansible playbooks, whose top level is a sequence, are wrapped as
//!   `{"playbooks": [...]}` so every document is a mapping.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use crate::types::Document;
use crate::{Error, Result};

/// Keys that mark a mapping as an Ansible play.
const PLAYBOOK_KEYS: [&str; 5] = ["hosts", "tasks", "roles", "become", "vars"];

/// Parse a YAML stream into documents. Empty documents are dropped.
pub fn parse(filename: &Path, content: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for deserializer in serde_yaml::Deserializer::from_str(content) {
        let value = YamlValue::deserialize(deserializer).map_err(|e| Error::Parse {
            file: filename.to_path_buf(),
            reason: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        documents.push(wrap_sequences(to_document(value)));
    }
    Ok(documents)
}

/// Convert a YAML value into the canonical document shape, preserving scalar
/// types and mapping order.
fn to_document(value: YamlValue) -> JsonValue {
    match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(b),
        YamlValue::Number(n) => yaml_number(n),
        YamlValue::String(s) => JsonValue::String(s),
        YamlValue::Sequence(seq) => JsonValue::Array(seq.into_iter().map(to_document).collect()),
        YamlValue::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (key, val) in map {
                object.insert(key_to_string(&key), to_document(val));
            }
            JsonValue::Object(object)
        }
        YamlValue::Tagged(tagged) => {
            let mut object = serde_json::Map::new();
            object.insert(intrinsic_name(&tagged.tag.to_string()), to_document(tagged.value));
            JsonValue::Object(object)
        }
    }
}

fn yaml_number(n: serde_yaml::Number) -> JsonValue {
    if let Some(i) = n.as_i64() {
        JsonValue::from(i)
    } else if let Some(u) = n.as_u64() {
        JsonValue::from(u)
    } else {
        n.as_f64().map_or(JsonValue::Null, JsonValue::from)
    }
}

/// YAML allows non-string mapping keys; the document model does not.
fn key_to_string(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Map a YAML short-form tag to its canonical CloudFormation function name.
/// `!Ref` stays `Ref`; every other tag becomes `Fn::<Tag>`.
fn intrinsic_name(tag: &str) -> String {
    let name = tag.trim_start_matches('!');
    if name == "Ref" {
        "Ref".to_string()
    } else {
        format!("Fn::{name}")
    }
}

/// Wrap top-level sequences so every document is a mapping.
fn wrap_sequences(doc: JsonValue) -> JsonValue {
    if doc.is_array() {
        let mut object = serde_json::Map::new();
        object.insert("playbooks".to_string(), doc);
        JsonValue::Object(object)
    } else {
        doc
    }
}

/// Whether a wrapped sequence looks like Ansible plays rather than a generic
/// YAML list: at least one entry must carry a playbook key.
pub fn is_playbook_list(value: &JsonValue) -> bool {
    value.as_array().is_some_and(|plays| {
        plays.iter().any(|play| {
            play.as_object()
                .is_some_and(|map| PLAYBOOK_KEYS.iter().any(|key| map.contains_key(*key)))
        })
    })
}
