// ABOUTME: defines the shared request/response protocol types used by wardsh and wardend.
// ABOUTME: provides parsing and validation helpers to keep daemon behavior deterministic.

use serde::{Deserialize, Serialize};

mod browser;
mod exec;
mod files;
mod system;
mod template;

pub use browser::{
    ClickRequest, ConsoleEntry, ConsoleLogsOutcome, ConsoleLogsRequest, ContentFormat,
    EvaluateOutcome, EvaluateRequest, NavigateOutcome, NavigateRequest, PageContentOutcome,
    PageContentRequest, ScreenshotMode, ScreenshotOutcome, ScreenshotRequest, TypeTextRequest,
    WaitForOutcome, WaitForRequest, WaitState,
};
pub use exec::{
    ExecErrorBody, ExecFailure, ExecRequest, ExecSuccess, ProgressPayload, SpawnDiagnostics,
    StreamEvent, StreamEventKind,
};
pub use files::{
    parse_file_op_input, BulkItemOutcome, BulkSummary, CreateFileRequest, DeleteFileOutcome,
    DeleteFileRequest, DirEntry, DirEntryKind, FileOpInput, ListDirOutcome, ListDirRequest,
    PathLevel, ReadFileOutcome, ReadFileRequest, UpdateFileRequest, WriteFileOutcome,
    MAX_BULK_ITEMS,
};
pub use system::{
    BranchWorkflowOutcome, BranchWorkflowRequest, DocResource, HealthReport, ProjectAnalysis,
    ProjectMeta,
};
pub use template::{
    CreatedEntry, CreatedEntryKind, GenerateProjectOutcome, GenerateProjectRequest, TemplateInfo,
};

/// Wire-level error category. Every refusal or failure the daemon reports
/// carries exactly one of these so clients can branch without string matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // policy
    Critical,
    SystemDirectory,
    Credential,
    CommandBlocked,
    CommandNotAllowed,
    PathTraversal,
    // state
    Exists,
    Missing,
    Protected,
    NotDirectory,
    TooLarge,
    InvalidBulkPayload,
    // operational
    BackupFailed,
    Io,
    // execution
    Spawn,
    Timeout,
    // template
    UnknownTemplate,
    ProjectExists,
    // boundary
    Browser,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

fn non_empty(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!("{field} must be non-empty")));
    }
    Ok(())
}

pub fn validate_create(req: &CreateFileRequest) -> Result<(), ValidationError> {
    non_empty(&req.file_path, "file_path")
}

pub fn validate_update(req: &UpdateFileRequest) -> Result<(), ValidationError> {
    non_empty(&req.file_path, "file_path")
}

pub fn validate_delete(req: &DeleteFileRequest) -> Result<(), ValidationError> {
    non_empty(&req.file_path, "file_path")
}

pub fn validate_read(req: &ReadFileRequest) -> Result<(), ValidationError> {
    non_empty(&req.file_path, "file_path")
}

pub fn validate_exec(req: &ExecRequest) -> Result<(), ValidationError> {
    non_empty(&req.command, "command")?;
    if let Some(timeout_ms) = req.timeout_ms {
        if timeout_ms == 0 {
            return Err(ValidationError::new("timeout_ms must be >= 1"));
        }
    }
    if let Some(interval) = req.keep_alive_interval_ms {
        if interval == 0 {
            return Err(ValidationError::new("keep_alive_interval_ms must be >= 1"));
        }
    }
    Ok(())
}

pub fn validate_generate(req: &GenerateProjectRequest) -> Result<(), ValidationError> {
    non_empty(&req.template_id, "template_id")?;
    non_empty(&req.project_name, "project_name")?;
    if req.project_name.contains('/') || req.project_name.contains("..") {
        return Err(ValidationError::new(
            "project_name must be a bare directory name",
        ));
    }
    Ok(())
}

pub fn validate_branch_workflow(req: &BranchWorkflowRequest) -> Result<(), ValidationError> {
    non_empty(&req.branch_name, "branch_name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_file_path() {
        let req = CreateFileRequest {
            file_path: "   ".to_string(),
            content: "x".to_string(),
            overwrite: false,
        };
        let err = validate_create(&req).unwrap_err();
        assert_eq!(err.message, "file_path must be non-empty");
    }

    #[test]
    fn validate_rejects_zero_exec_timeout() {
        let req = ExecRequest {
            command: "ls".to_string(),
            cwd: None,
            timeout_ms: Some(0),
            long_operation: false,
            stream_output: false,
            keep_alive_interval_ms: None,
        };
        let err = validate_exec(&req).unwrap_err();
        assert_eq!(err.message, "timeout_ms must be >= 1");
    }

    #[test]
    fn validate_rejects_nested_project_name() {
        let req = GenerateProjectRequest {
            template_id: "react-app".to_string(),
            project_name: "a/b".to_string(),
        };
        assert!(validate_generate(&req).is_err());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CommandNotAllowed).unwrap();
        assert_eq!(json, r#""command_not_allowed""#);
    }
}
