// ABOUTME: the sandboxed process executor: scrubbed environment, bounded time,
// ABOUTME: optional streaming, graceful-then-forceful termination, diagnostics on failure.

pub mod driver;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use warden_common::{
    ErrorKind, ExecErrorBody, ExecFailure, ExecRequest, ExecSuccess, ProgressPayload, StreamEvent,
    StreamEventKind,
};

use crate::config::Config;
use crate::error::OpError;
use crate::policy::resolve_in_workspace;
use driver::DriverScript;

const READ_CHUNK_BYTES: usize = 4096;
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const OUTPUT_TAIL_BYTES: usize = 500;
const STREAM_CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Clone)]
struct ResolvedOptions {
    command: String,
    cwd: PathBuf,
    timeout: Duration,
    long_operation: bool,
    stream_output: bool,
    keep_alive: Duration,
    grace_ms: u64,
    term_grace: Duration,
}

#[derive(Clone)]
pub struct Executor {
    cfg: Arc<Config>,
}

impl Executor {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    /// Buffered mode: run to completion and return one result. A non-zero
    /// exit is still a success; the exit code is reported verbatim.
    pub async fn run(&self, req: &ExecRequest) -> Result<ExecSuccess, Box<ExecFailure>> {
        let started = Instant::now();
        let opts = self
            .resolve(req)
            .map_err(|err| refusal_failure(&err, started))?;
        self.drive(opts, None).await
    }

    /// Streaming mode: chunks and progress flow through the returned channel
    /// and exactly one `Complete` or `Error` event terminates it.
    pub fn stream(&self, req: &ExecRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
        let executor = self.clone();
        let req = req.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = match executor.resolve(&req) {
                Ok(opts) => executor.drive(opts, Some(tx.clone())).await,
                Err(err) => Err(refusal_failure(&err, started)),
            };

            let terminal = match result {
                Ok(success) => StreamEvent::now(
                    StreamEventKind::Complete,
                    serde_json::to_value(&success).unwrap_or_default(),
                ),
                Err(failure) => StreamEvent::now(
                    StreamEventKind::Error,
                    serde_json::to_value(failure.as_ref()).unwrap_or_default(),
                ),
            };
            let _ = tx.send(terminal).await;
        });

        rx
    }

    fn resolve(&self, req: &ExecRequest) -> Result<ResolvedOptions, OpError> {
        let cwd = match &req.cwd {
            Some(raw) => {
                let (absolute, _) = resolve_in_workspace(&self.cfg, raw)?;
                let meta =
                    std::fs::metadata(&absolute).map_err(|_| OpError::Missing(raw.clone()))?;
                if !meta.is_dir() {
                    return Err(OpError::NotDirectory(raw.clone()));
                }
                absolute
            }
            None => self.cfg.workspace_root.clone(),
        };

        let timeout_ms = req.timeout_ms.unwrap_or(if req.long_operation {
            self.cfg.long_operation_timeout_ms
        } else {
            self.cfg.default_timeout_ms
        });
        let keep_alive_ms = req
            .keep_alive_interval_ms
            .unwrap_or(self.cfg.keep_alive_interval_ms);

        Ok(ResolvedOptions {
            command: req.command.clone(),
            cwd,
            timeout: Duration::from_millis(timeout_ms),
            long_operation: req.long_operation,
            stream_output: req.stream_output,
            keep_alive: Duration::from_millis(keep_alive_ms),
            grace_ms: self.cfg.post_command_grace_ms,
            term_grace: Duration::from_millis(self.cfg.term_grace_ms),
        })
    }

    /// One invocation: Starting → Running → (Completed | TimedOut).
    /// The single return value is the terminal-response latch; every exit
    /// path drops the driver temp file.
    async fn drive(
        &self,
        opts: ResolvedOptions,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<ExecSuccess, Box<ExecFailure>> {
        let started_wall = Utc::now();
        let started = Instant::now();

        let driver = DriverScript::materialize(&opts.command, opts.grace_ms)
            .map_err(|err| refusal_failure(&err, started))?;

        let mut command = Command::new("sh");
        command
            .arg(driver.path())
            .current_dir(&opts.cwd)
            .env_clear()
            .envs(scrubbed_env(&self.cfg))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let diagnostics = driver::spawn_diagnostics(
                    &opts.command,
                    &opts.cwd.to_string_lossy(),
                    &err,
                );
                return Err(Box::new(ExecFailure {
                    error: ExecErrorBody {
                        message: format!("failed to spawn command: {err}"),
                        kind: ErrorKind::Spawn,
                        code: err.raw_os_error().map(|c| c.to_string()),
                    },
                    stdout: String::new(),
                    stderr: String::new(),
                    diagnostics: Some(diagnostics),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }));
            }
        };

        let (Some(mut stdout_pipe), Some(mut stderr_pipe)) =
            (child.stdout.take(), child.stderr.take())
        else {
            return Err(internal_failure("child stdio was not piped", started));
        };

        let mut stdout_buf: Vec<u8> = Vec::new();
        let mut stderr_buf: Vec<u8> = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut chunks = 0usize;
        let mut last_output = Instant::now();

        let deadline = started + opts.timeout;
        let timeout_sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout_sleep);
        let mut keep_alive =
            tokio::time::interval_at(started + opts.keep_alive, opts.keep_alive);

        let mut stdout_chunk = [0u8; READ_CHUNK_BYTES];
        let mut stderr_chunk = [0u8; READ_CHUNK_BYTES];
        let exit_status = loop {
            tokio::select! {
                read = stdout_pipe.read(&mut stdout_chunk), if !stdout_done => {
                    match read {
                        Ok(0) | Err(_) => stdout_done = true,
                        Ok(n) => {
                            append_capped(&mut stdout_buf, &stdout_chunk[..n]);
                            chunks += 1;
                            last_output = Instant::now();
                            emit_chunk(&events, StreamEventKind::Stdout, &stdout_chunk[..n]).await;
                        }
                    }
                }
                read = stderr_pipe.read(&mut stderr_chunk), if !stderr_done => {
                    match read {
                        Ok(0) | Err(_) => stderr_done = true,
                        Ok(n) => {
                            append_capped(&mut stderr_buf, &stderr_chunk[..n]);
                            chunks += 1;
                            last_output = Instant::now();
                            emit_chunk(&events, StreamEventKind::Stderr, &stderr_chunk[..n]).await;
                        }
                    }
                }
                status = child.wait() => {
                    drain_pipe(&mut stdout_pipe, &mut stdout_buf, stdout_done).await;
                    drain_pipe(&mut stderr_pipe, &mut stderr_buf, stderr_done).await;
                    match status {
                        Ok(status) => break status,
                        Err(err) => return Err(internal_failure(&format!("wait failed: {err}"), started)),
                    }
                }
                _ = &mut timeout_sleep => {
                    terminate(&mut child, opts.long_operation, opts.term_grace).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!("⏱ command timed out after {elapsed_ms} ms");
                    return Err(Box::new(ExecFailure {
                        error: ExecErrorBody {
                            message: format!(
                                "command timed out after {} ms",
                                opts.timeout.as_millis()
                            ),
                            kind: ErrorKind::Timeout,
                            code: None,
                        },
                        stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                        stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                        diagnostics: None,
                        elapsed_ms,
                    }));
                }
                _ = keep_alive.tick(), if opts.long_operation => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::info!("⏳ still running after {elapsed_ms} ms");
                    if opts.stream_output {
                        emit_progress(&events, elapsed_ms, last_output, &stdout_buf, &stderr_buf)
                            .await;
                    }
                }
            }
        };

        let finished_wall = Utc::now();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let exit_code = exit_status.code().unwrap_or(-1);
        tracing::info!("▶ command finished with code {exit_code} in {elapsed_ms} ms");

        Ok(ExecSuccess {
            stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
            exit_code,
            started_at: started_wall,
            finished_at: finished_wall,
            elapsed_ms,
            output_chunks: opts.stream_output.then_some(chunks),
            long_operation: opts.long_operation,
        })
    }
}

/// The child sees the safe allowlist plus any variable carrying the agent
/// prefix; everything else in the daemon's environment stays invisible.
fn scrubbed_env(cfg: &Config) -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(name, _)| {
            cfg.safe_env_vars.iter().any(|safe| safe == name)
                || name.starts_with(&cfg.agent_env_prefix)
        })
        .collect()
}

fn append_capped(buf: &mut Vec<u8>, chunk: &[u8]) {
    if buf.len() >= MAX_CAPTURE_BYTES {
        return;
    }
    let room = MAX_CAPTURE_BYTES - buf.len();
    if chunk.len() > room {
        buf.extend_from_slice(&chunk[..room]);
        buf.extend_from_slice(b"\n[truncated]\n");
    } else {
        buf.extend_from_slice(chunk);
    }
}

async fn emit_chunk(
    events: &Option<mpsc::Sender<StreamEvent>>,
    kind: StreamEventKind,
    chunk: &[u8],
) {
    if let Some(tx) = events {
        let event = StreamEvent::now(
            kind,
            serde_json::Value::String(String::from_utf8_lossy(chunk).to_string()),
        );
        let _ = tx.send(event).await;
    }
}

async fn emit_progress(
    events: &Option<mpsc::Sender<StreamEvent>>,
    elapsed_ms: u64,
    last_output: Instant,
    stdout_buf: &[u8],
    stderr_buf: &[u8],
) {
    if let Some(tx) = events {
        let payload = ProgressPayload {
            elapsed_ms,
            since_last_output_ms: last_output.elapsed().as_millis() as u64,
            stdout_tail: tail_of(stdout_buf),
            stderr_tail: tail_of(stderr_buf),
        };
        let event = StreamEvent::now(
            StreamEventKind::Progress,
            serde_json::to_value(&payload).unwrap_or_default(),
        );
        let _ = tx.send(event).await;
    }
}

fn tail_of(buf: &[u8]) -> String {
    let start = buf.len().saturating_sub(OUTPUT_TAIL_BYTES);
    String::from_utf8_lossy(&buf[start..]).to_string()
}

/// After the child exits its pipes may still hold buffered bytes; a bounded
/// drain keeps a backgrounded grandchild from wedging the response.
async fn drain_pipe(
    pipe: &mut (impl AsyncReadExt + Unpin),
    buf: &mut Vec<u8>,
    already_done: bool,
) {
    if already_done {
        return;
    }
    let mut rest = Vec::new();
    if tokio::time::timeout(Duration::from_secs(1), pipe.read_to_end(&mut rest))
        .await
        .is_ok()
    {
        append_capped(buf, &rest);
    }
}

/// SIGTERM to the process group first; long operations get a grace window
/// and then SIGKILL. The caller still owns reaping via `wait`.
#[cfg(unix)]
async fn terminate(child: &mut Child, long_operation: bool, term_grace: Duration) {
    signal_group(child, libc::SIGTERM);
    if tokio::time::timeout(term_grace, child.wait()).await.is_err() && long_operation {
        signal_group(child, libc::SIGKILL);
        let _ = child.wait().await;
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: i32) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _long_operation: bool, _term_grace: Duration) {
    let _ = child.kill().await;
}

fn refusal_failure(err: &OpError, started: Instant) -> Box<ExecFailure> {
    Box::new(ExecFailure {
        error: ExecErrorBody {
            message: err.to_string(),
            kind: err.kind(),
            code: None,
        },
        stdout: String::new(),
        stderr: String::new(),
        diagnostics: None,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

fn internal_failure(message: &str, started: Instant) -> Box<ExecFailure> {
    Box::new(ExecFailure {
        error: ExecErrorBody {
            message: message.to_string(),
            kind: ErrorKind::Internal,
            code: None,
        },
        stdout: String::new(),
        stderr: String::new(),
        diagnostics: None,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
