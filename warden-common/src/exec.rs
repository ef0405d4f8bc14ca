// ABOUTME: request, result, and stream-event types for the sandboxed process executor.
// ABOUTME: failures carry structured diagnostics instead of free-form strings.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecRequest {
    pub command: String,
    pub cwd: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Extends the default timeout to five minutes and arms the
    /// graceful-then-forceful termination path.
    #[serde(default)]
    pub long_operation: bool,
    #[serde(default)]
    pub stream_output: bool,
    pub keep_alive_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecSuccess {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_chunks: Option<usize>,
    pub long_operation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecErrorBody {
    pub message: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Environment captured when a spawn fails, so the caller can tell a missing
/// tool apart from a broken one without shell access of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SpawnDiagnostics {
    pub command: String,
    pub cwd: String,
    pub path_env: Option<String>,
    pub daemon_version: String,
    pub platform: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likely_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecFailure {
    pub error: ExecErrorBody,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<SpawnDiagnostics>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    Stdout,
    Stderr,
    Progress,
    Complete,
    Error,
}

/// One server-sent event in streaming mode. Exactly one `Complete` or
/// `Error` event terminates the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn now(kind: StreamEventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a keep-alive `Progress` event for long operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProgressPayload {
    pub elapsed_ms: u64,
    pub since_last_output_ms: u64,
    pub stdout_tail: String,
    pub stderr_tail: String,
}
