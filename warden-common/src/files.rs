// ABOUTME: request and response types for the file operations plus the bulk envelope.
// ABOUTME: bulk detection is explicit so structural violations reject the whole batch.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Upper bound on items in one bulk request.
pub const MAX_BULK_ITEMS: usize = 50;

/// Classification level assigned to a workspace path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathLevel {
    Critical,
    SystemDirectory,
    ProjectFile,
    SystemFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateFileRequest {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UpdateFileRequest {
    pub file_path: String,
    pub content: String,
    /// When false, only paths the policy forces a snapshot for are backed up.
    #[serde(default = "default_true")]
    pub create_backup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeleteFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadFileRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ListDirRequest {
    #[serde(default = "default_dir")]
    pub dir_path: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub include_credentials: bool,
}

fn default_true() -> bool {
    true
}

fn default_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteFileOutcome {
    pub path: String,
    pub bytes_written: u64,
    pub backup_path: Option<String>,
    pub level: PathLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeleteFileOutcome {
    pub path: String,
    pub backup_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadFileOutcome {
    pub path: String,
    pub content_base64: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub level: PathLevel,
    pub protected: bool,
    pub credential: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirEntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: DirEntryKind,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub hidden: bool,
    pub credential: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ListDirOutcome {
    pub path: String,
    pub entries: Vec<DirEntry>,
    pub total: usize,
}

/// A request body for a file operation is either one item or a `files` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOpInput<T> {
    Single(T),
    Bulk(Vec<T>),
}

/// Detects and parses the overloaded single-vs-bulk request shape.
///
/// The `files` key switches to bulk mode; once present it must hold a
/// non-empty array of at most [`MAX_BULK_ITEMS`] well-formed items. Any
/// structural violation fails the whole request before anything runs.
pub fn parse_file_op_input<T: DeserializeOwned>(
    body: serde_json::Value,
) -> Result<FileOpInput<T>, String> {
    let has_files = body
        .as_object()
        .map(|obj| obj.contains_key("files"))
        .unwrap_or(false);

    if !has_files {
        let item: T =
            serde_json::from_value(body).map_err(|err| format!("invalid request body: {err}"))?;
        return Ok(FileOpInput::Single(item));
    }

    let files = body
        .get("files")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "files must be an array".to_string())?;

    if files.is_empty() {
        return Err("files must be non-empty".to_string());
    }
    if files.len() > MAX_BULK_ITEMS {
        return Err(format!("files exceeds the limit of {MAX_BULK_ITEMS} items"));
    }

    let mut items = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let item: T = serde_json::from_value(file.clone())
            .map_err(|err| format!("files[{index}] is invalid: {err}"))?;
        items.push(item);
    }
    Ok(FileOpInput::Bulk(items))
}

/// Per-item result of a bulk operation, keyed back to the input index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkItemOutcome {
    pub index: usize,
    pub file: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        rename = "type",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BulkSummary {
    pub total_files: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub execution_time_ms: u64,
    pub results: Vec<BulkItemOutcome>,
    pub errors: Vec<BulkItemOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rejects_unknown_fields_in_create_request() {
        let body = json!({
            "file_path": "src/App.tsx",
            "content": "x",
            "unexpected": "hallucination"
        });
        let parsed = parse_file_op_input::<CreateFileRequest>(body);
        assert!(parsed.is_err());
    }

    #[test]
    fn parse_detects_single_shape() {
        let body = json!({"file_path": "src/App.tsx", "content": "x"});
        match parse_file_op_input::<CreateFileRequest>(body).unwrap() {
            FileOpInput::Single(req) => {
                assert_eq!(req.file_path, "src/App.tsx");
                assert!(!req.overwrite);
            }
            FileOpInput::Bulk(_) => panic!("expected single shape"),
        }
    }

    #[test]
    fn parse_detects_bulk_shape() {
        let body = json!({"files": [
            {"file_path": "a.txt", "content": "a"},
            {"file_path": "b.txt", "content": "b"}
        ]});
        match parse_file_op_input::<CreateFileRequest>(body).unwrap() {
            FileOpInput::Bulk(items) => assert_eq!(items.len(), 2),
            FileOpInput::Single(_) => panic!("expected bulk shape"),
        }
    }

    #[test]
    fn parse_rejects_non_array_files() {
        let body = json!({"files": "a.txt"});
        let err = parse_file_op_input::<CreateFileRequest>(body).unwrap_err();
        assert_eq!(err, "files must be an array");
    }

    #[test]
    fn parse_rejects_empty_files() {
        let body = json!({"files": []});
        let err = parse_file_op_input::<CreateFileRequest>(body).unwrap_err();
        assert_eq!(err, "files must be non-empty");
    }

    #[test]
    fn parse_rejects_oversized_batch() {
        let items: Vec<_> = (0..51)
            .map(|i| json!({"file_path": format!("f{i}.txt"), "content": ""}))
            .collect();
        let err = parse_file_op_input::<CreateFileRequest>(json!({ "files": items })).unwrap_err();
        assert!(err.contains("limit of 50"));
    }

    #[test]
    fn parse_rejects_malformed_bulk_item() {
        let body = json!({"files": [{"file_path": "ok.txt", "content": ""}, {"content": "no path"}]});
        let err = parse_file_op_input::<CreateFileRequest>(body).unwrap_err();
        assert!(err.starts_with("files[1] is invalid"));
    }

    #[test]
    fn update_request_backs_up_by_default() {
        let req: UpdateFileRequest =
            serde_json::from_value(json!({"file_path": "a.txt", "content": "x"})).unwrap();
        assert!(req.create_backup);
    }

    #[test]
    fn bulk_item_outcome_omits_empty_sides() {
        let ok = BulkItemOutcome {
            index: 0,
            file: "a.txt".to_string(),
            success: true,
            result: Some(json!({"path": "a.txt"})),
            error: None,
            kind: None,
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v.get("error").is_none());
        assert!(v.get("type").is_none());

        let failed = BulkItemOutcome {
            index: 1,
            file: "b.txt".to_string(),
            success: false,
            result: None,
            error: Some("denied".to_string()),
            kind: Some(ErrorKind::SystemDirectory),
        };
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["type"], "system_directory");
        assert!(v.get("result").is_none());
    }
}
