//! Dockerfile backend: instruction lists into canonical documents.
//!
//! Dockerfiles have no tree structure of their own, so the document groups
//! instructions by build stage:
//!
//! ```json
//! {"command": {"<stage>": [
//!   {"Cmd": "from", "Original": "FROM alpine:3.19", "Value": ["alpine:3.19"],
//!    "StartLine": 1, "EndLine": 1}
//! ]}}
//! ```
//!
//! The stage key is the `AS` alias when present, else the image reference.
//! Continuation lines are folded into one logical instruction whose
//! `StartLine`/`EndLine` span the physical lines.

use std::path::Path;

use serde_json::{Map, Value};

use crate::types::Document;
use crate::{Error, Result};

struct Instruction {
    cmd: String,
    original: String,
    args: String,
    start_line: usize,
    end_line: usize,
}

/// Parse one Dockerfile into one document.
pub fn parse(filename: &Path, content: &str) -> Result<Vec<Document>> {
    let instructions = logical_instructions(content);
    if !instructions.iter().any(|i| i.cmd == "from") {
        return Err(Error::Parse {
            file: filename.to_path_buf(),
            reason: "no FROM instruction".into(),
        });
    }

    let mut stages: Map<String, Value> = Map::new();
    let mut current_stage = String::new();
    let mut pending: Vec<Value> = Vec::new();

    for instruction in instructions {
        if instruction.cmd == "from" {
            let value = split_args(&instruction.args);
            current_stage = stage_name(&value);
            let mut commands = std::mem::take(&mut pending);
            commands.push(to_value(&instruction));
            stages.insert(current_stage.clone(), Value::Array(commands));
        } else if current_stage.is_empty() {
            // ARG before the first FROM
            pending.push(to_value(&instruction));
        } else if let Some(Value::Array(commands)) = stages.get_mut(&current_stage) {
            commands.push(to_value(&instruction));
        }
    }

    let mut root = Map::new();
    root.insert("command".to_string(), Value::Object(stages));
    Ok(vec![Value::Object(root)])
}

/// Fold physical lines into logical instructions, dropping comments and
/// blanks and honouring trailing-backslash continuations.
fn logical_instructions(content: &str) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut buffer = String::new();
    let mut start_line = 0usize;
    let mut end_line = 0usize;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if buffer.is_empty() {
            start_line = index + 1;
        }
        end_line = index + 1;
        if let Some(stripped) = line.strip_suffix('\\') {
            buffer.push_str(stripped.trim_end());
            buffer.push(' ');
            continue;
        }
        buffer.push_str(line);
        if let Some(instruction) = finish(&buffer, start_line, end_line) {
            instructions.push(instruction);
        }
        buffer.clear();
    }
    // Unterminated continuation at EOF still yields its instruction.
    if !buffer.is_empty() {
        if let Some(instruction) = finish(buffer.trim_end(), start_line, end_line) {
            instructions.push(instruction);
        }
    }
    instructions
}

fn finish(logical: &str, start_line: usize, end_line: usize) -> Option<Instruction> {
    let mut parts = logical.splitn(2, char::is_whitespace);
    let keyword = parts.next()?;
    let args = parts.next().unwrap_or("").trim().to_string();
    Some(Instruction {
        cmd: keyword.to_lowercase(),
        original: logical.to_string(),
        args,
        start_line,
        end_line,
    })
}

/// Exec-form arguments are a JSON array; shell form splits on whitespace.
fn split_args(args: &str) -> Vec<String> {
    if args.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(args) {
            return items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
        }
    }
    args.split_whitespace().map(str::to_string).collect()
}

/// `FROM image [AS name]` names the stage after the alias when present.
fn stage_name(value: &[String]) -> String {
    let alias = value
        .iter()
        .position(|token| token.eq_ignore_ascii_case("as"))
        .and_then(|pos| value.get(pos + 1));
    alias
        .or_else(|| value.first())
        .cloned()
        .unwrap_or_default()
}

fn to_value(instruction: &Instruction) -> Value {
    let mut map = Map::new();
    map.insert("Cmd".into(), Value::String(instruction.cmd.clone()));
    map.insert("Original".into(), Value::String(instruction.original.clone()));
    map.insert(
        "Value".into(),
        Value::Array(
            split_args(&instruction.args)
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
    );
    map.insert("StartLine".into(), Value::from(instruction.start_line));
    map.insert("EndLine".into(), Value::from(instruction.end_line));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stages_group_instructions() {
        let docs = parse(
            Path::new("Dockerfile"),
            "FROM alpine:3.19 AS builder\nRUN apk add curl\nFROM alpine:3.19\nCOPY --from=builder /x /x\n",
        )
        .unwrap();
        let command = &docs[0]["command"];
        assert!(command["builder"].is_array());
        assert_eq!(command["builder"].as_array().unwrap().len(), 2);
        assert!(command["alpine:3.19"].is_array());
    }

    #[test]
    fn continuations_fold_with_line_spans() {
        let docs = parse(
            Path::new("Dockerfile"),
            "FROM ubuntu:22.04\nRUN apt-get update && \\\n    apt-get install -y curl\n",
        )
        .unwrap();
        let run = &docs[0]["command"]["ubuntu:22.04"][1];
        assert_eq!(run["Cmd"], json!("run"));
        assert_eq!(run["StartLine"], json!(2));
        assert_eq!(run["EndLine"], json!(3));
        assert!(run["Original"].as_str().unwrap().contains("apt-get install"));
    }

    #[test]
    fn exec_form_is_split_as_json() {
        let docs = parse(
            Path::new("Dockerfile"),
            "FROM alpine\nENTRYPOINT [\"/bin/sh\", \"-c\"]\n",
        )
        .unwrap();
        let entrypoint = &docs[0]["command"]["alpine"][1];
        assert_eq!(entrypoint["Value"], json!(["/bin/sh", "-c"]));
    }

    #[test]
    fn args_before_from_attach_to_first_stage() {
        let docs = parse(
            Path::new("Dockerfile"),
            "ARG VERSION=3.19\nFROM alpine:${VERSION}\n",
        )
        .unwrap();
        let stage = docs[0]["command"].as_object().unwrap().values().next().unwrap();
        assert_eq!(stage[0]["Cmd"], json!("arg"));
        assert_eq!(stage[1]["Cmd"], json!("from"));
    }

    #[test]
    fn missing_from_is_a_parse_error() {
        let err = parse(Path::new("Dockerfile"), "RUN echo hi\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
