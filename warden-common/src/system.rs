// ABOUTME: types for the system surface: health, project analysis, metadata, git workflow.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub workspace_root: String,
    pub critical_files: Vec<String>,
    pub protected_directories: Vec<String>,
    pub backup_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectAnalysis {
    pub project_type: String,
    pub features: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DocResource {
    pub name: String,
    pub path: String,
}

/// Ambient project metadata: the manifest, the names (never values) of
/// environment variables, and any doc resources supplied by the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectMeta {
    pub manifest: Option<serde_json::Value>,
    pub env_var_names: Vec<String>,
    pub docs: Vec<DocResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BranchWorkflowRequest {
    pub branch_name: String,
    #[serde(default)]
    pub push: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BranchWorkflowOutcome {
    pub branch: String,
    pub created: bool,
    pub committed: bool,
    pub pushed: bool,
    pub commit_message: String,
}
