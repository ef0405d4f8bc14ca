// ABOUTME: runs the workspace daemon that validates and executes agent operations.
// ABOUTME: listens on a single tcp port and writes an audit log for each request.

mod actions;
mod audit;
mod backup;
mod config;
mod error;
mod exec;
mod policy;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::actions::browser::{Browser, DisconnectedDriver};
use crate::actions::files::FileOps;
use crate::actions::system::SystemOps;
use crate::actions::template::{TemplateGenerator, TemplateRegistry};
use crate::audit::AuditLog;
use crate::backup::BackupStore;
use crate::config::Config;
use crate::exec::Executor;
use crate::policy::CommandPolicy;
use crate::server::AppState;

#[derive(Debug, Parser)]
struct Args {
    /// Directory the daemon confines every operation to.
    #[arg(long, default_value = ".")]
    workspace_root: std::path::PathBuf,

    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = "./wardend-audit.jsonl")]
    audit_path: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let cfg = Arc::new(Config::new(args.workspace_root)?);

    let backups = Arc::new(BackupStore::new(cfg.backup_dir(), cfg.backup_retention));
    let files = Arc::new(FileOps::new(cfg.clone(), backups.clone()));
    let state = AppState {
        files: files.clone(),
        executor: Executor::new(cfg.clone()),
        command_policy: Arc::new(CommandPolicy::new(&cfg)),
        browser: Arc::new(Browser::new(Arc::new(DisconnectedDriver))),
        templates: Arc::new(TemplateGenerator::new(
            cfg.clone(),
            files,
            TemplateRegistry::bundled()?,
        )),
        system: Arc::new(SystemOps::new(cfg.clone(), backups)),
        audit: Arc::new(AuditLog::new(args.audit_path)),
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("bind port {}", args.port))?;
    tracing::info!(
        "🛡 wardend listening on port {} for workspace {}",
        args.port,
        cfg.workspace_root.display()
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    tracing::warn!("failed to install SIGTERM handler: {err}");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
