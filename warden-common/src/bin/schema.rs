// ABOUTME: emits json schemas for the warden request types to stdout.
// ABOUTME: intended for use with constrained decoding and external validators.

use serde_json::json;

fn main() {
    let schemas = json!({
        "create_file": schemars::schema_for!(warden_common::CreateFileRequest),
        "update_file": schemars::schema_for!(warden_common::UpdateFileRequest),
        "delete_file": schemars::schema_for!(warden_common::DeleteFileRequest),
        "read_file": schemars::schema_for!(warden_common::ReadFileRequest),
        "list_dir": schemars::schema_for!(warden_common::ListDirRequest),
        "exec": schemars::schema_for!(warden_common::ExecRequest),
        "navigate": schemars::schema_for!(warden_common::NavigateRequest),
        "screenshot": schemars::schema_for!(warden_common::ScreenshotRequest),
        "evaluate": schemars::schema_for!(warden_common::EvaluateRequest),
        "click": schemars::schema_for!(warden_common::ClickRequest),
        "type_text": schemars::schema_for!(warden_common::TypeTextRequest),
        "wait_for": schemars::schema_for!(warden_common::WaitForRequest),
        "page_content": schemars::schema_for!(warden_common::PageContentRequest),
        "console_logs": schemars::schema_for!(warden_common::ConsoleLogsRequest),
        "generate_project": schemars::schema_for!(warden_common::GenerateProjectRequest),
        "branch_workflow": schemars::schema_for!(warden_common::BranchWorkflowRequest),
    });
    let json = serde_json::to_string_pretty(&schemas).expect("serialize schemas");
    println!("{json}");
}


