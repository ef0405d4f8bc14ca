// ABOUTME: writes append-only audit records for each operation the boundary dispatches.
// ABOUTME: records carry targets and decisions, never file content or env values.

use std::path::PathBuf;

use anyhow::Context;
use warden_common::ErrorKind;

#[derive(Debug, serde::Serialize)]
#[serde(deny_unknown_fields)]
struct AuditRecord<'a> {
    ts_unix_ms: u64,
    op: &'a str,
    target: &'a str,
    outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Appends one JSONL record. Audit failures are reported, not fatal:
    /// the operation result has already been produced.
    pub async fn append(
        &self,
        ts_unix_ms: u64,
        op: &str,
        target: &str,
        kind: Option<ErrorKind>,
    ) -> anyhow::Result<()> {
        let record = AuditRecord {
            ts_unix_ms,
            op,
            target,
            outcome: if kind.is_none() { "ok" } else { "refused" },
            kind,
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open audit log at {}", self.path.display()))?;

        use tokio::io::AsyncWriteExt;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn record(&self, op: &str, target: &str, kind: Option<ErrorKind>) {
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        if let Err(err) = self.append(now_ms, op, target, kind).await {
            tracing::warn!("audit append failed: {err}");
        }
    }
}
