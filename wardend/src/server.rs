// ABOUTME: hosts the http boundary: routes json requests into the operation handlers,
// ABOUTME: maps the error taxonomy onto statuses, and audits every dispatched operation.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use warden_common::{
    parse_file_op_input, validate_branch_workflow, validate_create, validate_delete,
    validate_exec, validate_generate, validate_read, validate_update, BranchWorkflowRequest,
    ClickRequest, ConsoleLogsRequest, CreateFileRequest, DeleteFileRequest, ErrorKind,
    EvaluateRequest, ExecRequest, FileOpInput, GenerateProjectRequest, ListDirRequest,
    NavigateRequest, PageContentRequest, ReadFileRequest, ScreenshotRequest, StreamEvent,
    TypeTextRequest, UpdateFileRequest, ValidationError, WaitForRequest,
};

use crate::actions::browser::Browser;
use crate::actions::bulk::run_bulk;
use crate::actions::files::FileOps;
use crate::actions::system::SystemOps;
use crate::actions::template::TemplateGenerator;
use crate::audit::AuditLog;
use crate::error::OpError;
use crate::exec::Executor;
use crate::policy::CommandPolicy;

#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileOps>,
    pub executor: Executor,
    pub command_policy: Arc<CommandPolicy>,
    pub browser: Arc<Browser>,
    pub templates: Arc<TemplateGenerator>,
    pub system: Arc<SystemOps>,
    pub audit: Arc<AuditLog>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files/create", post(create_file))
        .route("/files/update", post(update_file))
        .route("/files/delete", post(delete_file))
        .route("/files/read", post(read_file))
        .route("/files/list", post(list_dir))
        .route("/execute", post(execute))
        .route("/browser/navigate", post(browser_navigate))
        .route("/browser/screenshot", post(browser_screenshot))
        .route("/browser/evaluate", post(browser_evaluate))
        .route("/browser/click", post(browser_click))
        .route("/browser/type", post(browser_type))
        .route("/browser/wait-for", post(browser_wait_for))
        .route("/browser/content", post(browser_content))
        .route("/browser/console-logs", post(browser_console_logs))
        .route("/browser/close", post(browser_close))
        .route("/templates", get(list_templates))
        .route("/templates/generate", post(generate_project))
        .route("/system/health", get(system_health))
        .route("/project/analyze", get(project_analyze))
        .route("/project/meta", get(project_meta))
        .route("/git/branch-workflow", post(branch_workflow))
        .with_state(state)
}

pub struct AppRejection(OpError);

impl From<OpError> for AppRejection {
    fn from(err: OpError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for AppRejection {
    fn from(err: ValidationError) -> Self {
        Self(OpError::InvalidRequest(err.message))
    }
}

impl IntoResponse for AppRejection {
    fn into_response(self) -> Response {
        let api = self.0.to_api();
        (status_for(api.kind), Json(api)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Critical
        | ErrorKind::SystemDirectory
        | ErrorKind::Credential
        | ErrorKind::CommandBlocked
        | ErrorKind::CommandNotAllowed
        | ErrorKind::PathTraversal => StatusCode::FORBIDDEN,
        ErrorKind::Missing | ErrorKind::UnknownTemplate => StatusCode::NOT_FOUND,
        ErrorKind::Exists | ErrorKind::ProjectExists => StatusCode::CONFLICT,
        ErrorKind::Protected
        | ErrorKind::NotDirectory
        | ErrorKind::TooLarge
        | ErrorKind::InvalidBulkPayload
        | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Browser => StatusCode::BAD_GATEWAY,
        ErrorKind::BackupFailed | ErrorKind::Io | ErrorKind::Spawn | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Bulk detection wrapper: structural violations of the `files` shape reject
/// the whole request; a body without `files` is a single item.
fn parse_input<T: serde::de::DeserializeOwned>(body: Value) -> Result<FileOpInput<T>, OpError> {
    let bulk = body.get("files").is_some();
    parse_file_op_input(body).map_err(|message| {
        if bulk {
            OpError::InvalidBulkPayload(message)
        } else {
            OpError::InvalidRequest(message)
        }
    })
}

async fn audited<T>(
    state: &AppState,
    op: &str,
    target: &str,
    result: Result<T, OpError>,
) -> Result<Json<T>, AppRejection> {
    state
        .audit
        .record(op, target, result.as_ref().err().map(OpError::kind))
        .await;
    result.map(Json).map_err(AppRejection)
}

async fn create_file(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppRejection> {
    match parse_input::<CreateFileRequest>(body)? {
        FileOpInput::Single(req) => {
            validate_create(&req)?;
            let result = state.files.create(&req).await;
            Ok(audited(&state, "file.create", &req.file_path, result)
                .await?
                .into_response())
        }
        FileOpInput::Bulk(items) => {
            for item in &items {
                validate_create(item)?;
            }
            let files = state.files.clone();
            let summary = run_bulk(items, |r| r.file_path.as_str(), move |req| {
                let files = files.clone();
                async move { files.create(&req).await }
            })
            .await;
            state
                .audit
                .record(
                    "file.create.bulk",
                    &format!("{} items", summary.total_files),
                    None,
                )
                .await;
            Ok(Json(summary).into_response())
        }
    }
}

async fn update_file(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppRejection> {
    match parse_input::<UpdateFileRequest>(body)? {
        FileOpInput::Single(req) => {
            validate_update(&req)?;
            let result = state.files.update(&req).await;
            Ok(audited(&state, "file.update", &req.file_path, result)
                .await?
                .into_response())
        }
        FileOpInput::Bulk(items) => {
            for item in &items {
                validate_update(item)?;
            }
            let files = state.files.clone();
            let summary = run_bulk(items, |r| r.file_path.as_str(), move |req| {
                let files = files.clone();
                async move { files.update(&req).await }
            })
            .await;
            state
                .audit
                .record(
                    "file.update.bulk",
                    &format!("{} items", summary.total_files),
                    None,
                )
                .await;
            Ok(Json(summary).into_response())
        }
    }
}

async fn delete_file(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppRejection> {
    match parse_input::<DeleteFileRequest>(body)? {
        FileOpInput::Single(req) => {
            validate_delete(&req)?;
            let result = state.files.delete(&req).await;
            Ok(audited(&state, "file.delete", &req.file_path, result)
                .await?
                .into_response())
        }
        FileOpInput::Bulk(items) => {
            for item in &items {
                validate_delete(item)?;
            }
            let files = state.files.clone();
            let summary = run_bulk(items, |r| r.file_path.as_str(), move |req| {
                let files = files.clone();
                async move { files.delete(&req).await }
            })
            .await;
            state
                .audit
                .record(
                    "file.delete.bulk",
                    &format!("{} items", summary.total_files),
                    None,
                )
                .await;
            Ok(Json(summary).into_response())
        }
    }
}

async fn read_file(
    State(state): State<AppState>,
    Json(req): Json<ReadFileRequest>,
) -> Result<Response, AppRejection> {
    validate_read(&req)?;
    let result = state.files.read(&req).await;
    Ok(audited(&state, "file.read", &req.file_path, result)
        .await?
        .into_response())
}

async fn list_dir(
    State(state): State<AppState>,
    Json(req): Json<ListDirRequest>,
) -> Result<Response, AppRejection> {
    let result = state.files.list(&req).await;
    Ok(audited(&state, "file.list", &req.dir_path, result)
        .await?
        .into_response())
}

async fn execute(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let req: ExecRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(err) => {
            return AppRejection(OpError::InvalidRequest(format!(
                "invalid request body: {err}"
            )))
            .into_response()
        }
    };
    if let Err(err) = validate_exec(&req) {
        return AppRejection::from(err).into_response();
    }

    if let Err(err) = state.command_policy.classify(&req.command) {
        state
            .audit
            .record("exec", &req.command, Some(err.kind()))
            .await;
        return AppRejection(err).into_response();
    }
    state.audit.record("exec", &req.command, None).await;

    if req.stream_output {
        let rx = state.executor.stream(&req);
        return sse_response(rx).into_response();
    }

    match state.executor.run(&req).await {
        Ok(success) => Json(success).into_response(),
        Err(failure) => {
            let status = status_for(failure.error.kind);
            (status, Json(*failure)).into_response()
        }
    }
}

/// Wraps the executor's event channel as `data:` frames; the channel closes
/// right after its single terminal event.
fn sse_response(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl futures::Stream<Item = Result<Event, axum::Error>>> {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn browser_navigate(
    State(state): State<AppState>,
    Json(req): Json<NavigateRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.navigate(&req).await;
    Ok(audited(&state, "browser.navigate", &req.url, result)
        .await?
        .into_response())
}

async fn browser_screenshot(
    State(state): State<AppState>,
    Json(req): Json<ScreenshotRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.screenshot(&req).await;
    Ok(audited(&state, "browser.screenshot", "page", result)
        .await?
        .into_response())
}

async fn browser_evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.evaluate(&req).await;
    Ok(audited(&state, "browser.evaluate", &req.expression, result)
        .await?
        .into_response())
}

async fn browser_click(
    State(state): State<AppState>,
    Json(req): Json<ClickRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.click(&req).await;
    Ok(audited(&state, "browser.click", &req.selector, result)
        .await?
        .into_response())
}

async fn browser_type(
    State(state): State<AppState>,
    Json(req): Json<TypeTextRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.type_text(&req).await;
    Ok(audited(&state, "browser.type", &req.selector, result)
        .await?
        .into_response())
}

async fn browser_wait_for(
    State(state): State<AppState>,
    Json(req): Json<WaitForRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.wait_for(&req).await;
    Ok(audited(&state, "browser.wait_for", &req.selector, result)
        .await?
        .into_response())
}

async fn browser_content(
    State(state): State<AppState>,
    Json(req): Json<PageContentRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.page_content(&req).await;
    Ok(audited(&state, "browser.content", "page", result)
        .await?
        .into_response())
}

async fn browser_console_logs(
    State(state): State<AppState>,
    Json(req): Json<ConsoleLogsRequest>,
) -> Result<Response, AppRejection> {
    let result = state.browser.console_logs(&req).await;
    Ok(audited(&state, "browser.console_logs", "page", result)
        .await?
        .into_response())
}

async fn browser_close(State(state): State<AppState>) -> Result<Response, AppRejection> {
    let result = state.browser.close().await;
    Ok(audited(&state, "browser.close", "page", result)
        .await?
        .into_response())
}

async fn list_templates(State(state): State<AppState>) -> Response {
    let templates = state.templates.list();
    state.audit.record("template.list", "templates", None).await;
    Json(templates).into_response()
}

async fn generate_project(
    State(state): State<AppState>,
    Json(req): Json<GenerateProjectRequest>,
) -> Result<Response, AppRejection> {
    validate_generate(&req)?;
    let result = state.templates.generate(&req).await;
    Ok(audited(&state, "template.generate", &req.project_name, result)
        .await?
        .into_response())
}

async fn system_health(State(state): State<AppState>) -> Response {
    let report = state.system.health().await;
    state.audit.record("system.health", "system", None).await;
    Json(report).into_response()
}

async fn project_analyze(State(state): State<AppState>) -> Result<Response, AppRejection> {
    let result = state.system.analyze().await;
    Ok(audited(&state, "project.analyze", "workspace", result)
        .await?
        .into_response())
}

async fn project_meta(State(state): State<AppState>) -> Result<Response, AppRejection> {
    let result = state.system.project_meta().await;
    Ok(audited(&state, "project.meta", "workspace", result)
        .await?
        .into_response())
}

async fn branch_workflow(
    State(state): State<AppState>,
    Json(req): Json<BranchWorkflowRequest>,
) -> Result<Response, AppRejection> {
    validate_branch_workflow(&req)?;
    let result = state.system.branch_workflow(&req).await;
    Ok(audited(&state, "git.branch_workflow", &req.branch_name, result)
        .await?
        .into_response())
}
