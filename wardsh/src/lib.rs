// ABOUTME: provides wardsh helpers for parsing and validating requests before sending them.
// ABOUTME: keeps client behavior deterministic by enforcing local validation first.

use clap::ValueEnum;
use serde_json::Value;
use warden_common::{
    parse_file_op_input, validate_branch_workflow, validate_create, validate_delete,
    validate_exec, validate_generate, validate_read, validate_update, BranchWorkflowRequest,
    CreateFileRequest, DeleteFileRequest, ExecRequest, FileOpInput, GenerateProjectRequest,
    ListDirRequest, ReadFileRequest, UpdateFileRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Op {
    CreateFile,
    UpdateFile,
    DeleteFile,
    ReadFile,
    ListDir,
    Exec,
    Generate,
    BranchWorkflow,
}

impl Op {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Op::CreateFile => "/files/create",
            Op::UpdateFile => "/files/update",
            Op::DeleteFile => "/files/delete",
            Op::ReadFile => "/files/read",
            Op::ListDir => "/files/list",
            Op::Exec => "/execute",
            Op::Generate => "/templates/generate",
            Op::BranchWorkflow => "/git/branch-workflow",
        }
    }
}

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ValidateVerdict {
    pub ok: bool,
    pub error: Option<String>,
}

/// Validates a payload locally the same way the daemon will, so malformed
/// requests fail fast without a round trip.
pub fn validate_payload(op: Op, payload: &Value) -> ValidateVerdict {
    match check(op, payload) {
        Ok(()) => ValidateVerdict {
            ok: true,
            error: None,
        },
        Err(message) => ValidateVerdict {
            ok: false,
            error: Some(message),
        },
    }
}

fn check(op: Op, payload: &Value) -> Result<(), String> {
    match op {
        Op::CreateFile => each_item::<CreateFileRequest>(payload, |req| {
            validate_create(req).map_err(|e| e.message)
        }),
        Op::UpdateFile => each_item::<UpdateFileRequest>(payload, |req| {
            validate_update(req).map_err(|e| e.message)
        }),
        Op::DeleteFile => each_item::<DeleteFileRequest>(payload, |req| {
            validate_delete(req).map_err(|e| e.message)
        }),
        Op::ReadFile => {
            let req: ReadFileRequest = parse(payload)?;
            validate_read(&req).map_err(|e| e.message)
        }
        Op::ListDir => {
            let _: ListDirRequest = parse(payload)?;
            Ok(())
        }
        Op::Exec => {
            let req: ExecRequest = parse(payload)?;
            validate_exec(&req).map_err(|e| e.message)
        }
        Op::Generate => {
            let req: GenerateProjectRequest = parse(payload)?;
            validate_generate(&req).map_err(|e| e.message)
        }
        Op::BranchWorkflow => {
            let req: BranchWorkflowRequest = parse(payload)?;
            validate_branch_workflow(&req).map_err(|e| e.message)
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, String> {
    serde_json::from_value(payload.clone()).map_err(|err| format!("invalid payload: {err}"))
}

fn each_item<T: serde::de::DeserializeOwned>(
    payload: &Value,
    validate: impl Fn(&T) -> Result<(), String>,
) -> Result<(), String> {
    match parse_file_op_input::<T>(payload.clone())? {
        FileOpInput::Single(item) => validate(&item),
        FileOpInput::Bulk(items) => items.iter().try_for_each(validate),
    }
}

/// Loads the payload from `--file`, `--json`, or refuses when both or
/// neither is given.
pub fn load_payload(file: Option<&str>, json: Option<&str>) -> anyhow::Result<Value> {
    let raw = match (file, json) {
        (Some(_), Some(_)) => anyhow::bail!("pass either --file or --json, not both"),
        (Some(path), None) => std::fs::read_to_string(path)?,
        (None, Some(inline)) => inline.to_string(),
        (None, None) => anyhow::bail!("a payload is required; pass --file or --json"),
    };
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exec_payload_validates_locally() {
        let verdict = validate_payload(Op::Exec, &json!({"command": "npm test"}));
        assert!(verdict.ok);

        let verdict = validate_payload(Op::Exec, &json!({"command": "   "}));
        assert_eq!(verdict.error.as_deref(), Some("command must be non-empty"));
    }

    #[test]
    fn bulk_create_payload_validates_every_item() {
        let verdict = validate_payload(
            Op::CreateFile,
            &json!({"files": [
                {"file_path": "src/a.ts", "content": "a"},
                {"file_path": " ", "content": "b"}
            ]}),
        );
        assert!(!verdict.ok);
    }

    #[test]
    fn unknown_fields_fail_validation() {
        let verdict = validate_payload(
            Op::ReadFile,
            &json!({"file_path": "a.txt", "surprise": true}),
        );
        assert!(!verdict.ok);
    }

    #[test]
    fn load_payload_requires_exactly_one_source() {
        assert!(load_payload(None, None).is_err());
        assert!(load_payload(Some("a"), Some("b")).is_err());
        let value = load_payload(None, Some(r#"{"x":1}"#)).unwrap();
        assert_eq!(value["x"], 1);
    }

    #[test]
    fn endpoints_map_one_to_one() {
        assert_eq!(Op::Exec.endpoint(), "/execute");
        assert_eq!(Op::CreateFile.endpoint(), "/files/create");
    }
}
