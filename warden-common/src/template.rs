// ABOUTME: request and response types for scaffolding projects from bundled templates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GenerateProjectRequest {
    pub template_id: String,
    pub project_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreatedEntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreatedEntry {
    #[serde(rename = "type")]
    pub kind: CreatedEntryKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GenerateProjectOutcome {
    pub template_id: String,
    pub project_name: String,
    pub directories_created: usize,
    pub files_created: usize,
    pub entries: Vec<CreatedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub directories: usize,
    pub files: usize,
}
