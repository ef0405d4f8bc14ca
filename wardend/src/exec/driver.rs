// ABOUTME: composes the driver script that runs a validated command and is the only
// ABOUTME: place in the daemon that performs string composition of executable text.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::error::OpError;
use warden_common::SpawnDiagnostics;

/// Characters that force dispatch through `sh -c` instead of a bare word.
const SHELL_METACHARACTERS: &[char] = &['|', '&', ';', '<', '>', '(', ')', '{', '}'];

pub fn has_shell_metacharacters(command: &str) -> bool {
    command.contains(SHELL_METACHARACTERS)
}

/// Single quotes are the one character that can break out of a single-quoted
/// sh string; everything else is inert inside the quotes.
pub fn escape_single_quotes(command: &str) -> String {
    command.replace('\'', r"'\''")
}

/// Builds the POSIX sh driver: run the command, remember its exit status,
/// give late asynchronous work a grace window to flush, then exit with the
/// command's status so the parent sees it verbatim.
pub fn compose_driver(command: &str, grace_ms: u64) -> String {
    let invocation = if has_shell_metacharacters(command) {
        format!("sh -c '{}'", escape_single_quotes(command))
    } else {
        command.to_string()
    };

    let grace_secs = grace_ms as f64 / 1000.0;
    format!(
        "#!/bin/sh\nset -u\n{invocation}\nwarden_status=$?\nsleep {grace_secs}\nexit $warden_status\n"
    )
}

/// The driver materialized to a uniquely named temporary file. Dropping the
/// handle unlinks the file on every exit path, including panics and kills.
pub struct DriverScript {
    file: NamedTempFile,
}

impl DriverScript {
    pub fn materialize(command: &str, grace_ms: u64) -> Result<Self, OpError> {
        let mut file = tempfile::Builder::new()
            .prefix("warden-exec-")
            .suffix(".sh")
            .tempfile()?;
        file.write_all(compose_driver(command, grace_ms).as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

/// Captured when a spawn fails so the caller can tell a missing tool apart
/// from a broken one.
pub fn spawn_diagnostics(command: &str, cwd: &str, err: &std::io::Error) -> SpawnDiagnostics {
    let mut diagnostics = SpawnDiagnostics {
        command: command.to_string(),
        cwd: cwd.to_string(),
        path_env: std::env::var("PATH").ok(),
        daemon_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        likely_cause: None,
        install_hint: None,
    };

    if err.kind() == std::io::ErrorKind::NotFound {
        let tool = command.split_whitespace().next().unwrap_or(command);
        diagnostics.likely_cause = Some(format!("{tool} is not installed or not on PATH"));
        diagnostics.install_hint = match tool {
            "npm" => Some("install Node.js, which ships npm: https://nodejs.org".to_string()),
            "yarn" => Some("npm install -g yarn".to_string()),
            "pnpm" => Some("npm install -g pnpm".to_string()),
            _ => None,
        };
    }

    diagnostics
}
