// ABOUTME: the system surface: health inventory, project analysis, ambient metadata,
// ABOUTME: and the create-or-checkout git branch workflow.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use warden_common::{
    BranchWorkflowOutcome, BranchWorkflowRequest, DocResource, HealthReport, ProjectAnalysis,
    ProjectMeta,
};

use crate::backup::BackupStore;
use crate::config::Config;
use crate::error::OpError;

static BRANCH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-_/]+$").expect("branch name pattern"));

pub struct SystemOps {
    cfg: Arc<Config>,
    backups: Arc<BackupStore>,
}

impl SystemOps {
    pub fn new(cfg: Arc<Config>, backups: Arc<BackupStore>) -> Self {
        Self { cfg, backups }
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            workspace_root: self.cfg.workspace_root.to_string_lossy().to_string(),
            critical_files: self.cfg.critical_files.clone(),
            protected_directories: self.cfg.protected_directories.clone(),
            backup_count: self.backups.count().await,
        }
    }

    /// Coarse project-type and feature detection from the manifest plus a
    /// few well-known files, with improvement suggestions for what's absent.
    pub async fn analyze(&self) -> Result<ProjectAnalysis, OpError> {
        let manifest = self.read_manifest().await;
        let mut features = Vec::new();
        let mut suggestions = Vec::new();

        let project_type = match &manifest {
            Some(manifest) => {
                let has_dep = |name: &str| {
                    ["dependencies", "devDependencies"].iter().any(|section| {
                        manifest
                            .get(section)
                            .and_then(|deps| deps.get(name))
                            .is_some()
                    })
                };
                if has_dep("next") {
                    "next"
                } else if has_dep("react") {
                    "react"
                } else if has_dep("express") {
                    "express"
                } else {
                    "node"
                }
            }
            None => "unknown",
        }
        .to_string();

        for (file, feature) in [
            ("tsconfig.json", "typescript"),
            ("Dockerfile", "docker"),
            (".eslintrc.json", "eslint"),
        ] {
            if self.workspace_has(file).await {
                features.push(feature.to_string());
            }
        }
        for candidate in ["tailwind.config.js", "tailwind.config.ts"] {
            if self.workspace_has(candidate).await {
                features.push("tailwind".to_string());
                break;
            }
        }
        if self.workspace_has("__tests__").await {
            features.push("tests".to_string());
        }

        if !self.workspace_has("README.md").await {
            suggestions.push("add a README.md describing the project".to_string());
        }
        if !self.workspace_has(".gitignore").await {
            suggestions.push("add a .gitignore before committing".to_string());
        }
        if !features.iter().any(|f| f == "tests") {
            suggestions.push("add a __tests__ directory with test coverage".to_string());
        }

        Ok(ProjectAnalysis {
            project_type,
            features,
            suggestions,
        })
    }

    /// Ambient metadata: manifest, env var names from the workspace .env
    /// (names only, never values), and doc resources under docs/.
    pub async fn project_meta(&self) -> Result<ProjectMeta, OpError> {
        let manifest = self.read_manifest().await;

        let mut env_var_names = Vec::new();
        if let Ok(env_text) =
            tokio::fs::read_to_string(self.cfg.workspace_root.join(".env")).await
        {
            for line in env_text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((name, _)) = line.split_once('=') {
                    env_var_names.push(name.trim().to_string());
                }
            }
        }

        let mut docs = Vec::new();
        if let Ok(mut dir) = tokio::fs::read_dir(self.cfg.workspace_root.join("docs")).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                if entry.metadata().await.map(|m| m.is_file()).unwrap_or(false) {
                    let name = entry.file_name().to_string_lossy().to_string();
                    docs.push(DocResource {
                        path: format!("docs/{name}"),
                        name,
                    });
                }
            }
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ProjectMeta {
            manifest,
            env_var_names,
            docs,
        })
    }

    /// Create-or-checkout a branch, write a metadata file, commit it with a
    /// templated message, and push only when an origin remote exists.
    pub async fn branch_workflow(
        &self,
        req: &BranchWorkflowRequest,
    ) -> Result<BranchWorkflowOutcome, OpError> {
        if !BRANCH_NAME.is_match(&req.branch_name) {
            return Err(OpError::InvalidRequest(format!(
                "branch name {} contains invalid characters",
                req.branch_name
            )));
        }

        let exists = self
            .git(&["rev-parse", "--verify", &format!("refs/heads/{}", req.branch_name)])
            .await
            .is_ok();
        if exists {
            self.git(&["checkout", &req.branch_name]).await?;
        } else {
            self.git(&["checkout", "-b", &req.branch_name]).await?;
        }

        let metadata = serde_json::json!({
            "branch": req.branch_name,
            "created": !exists,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let metadata_path = self.cfg.workspace_root.join("branch-workflow.json");
        let metadata_bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| OpError::Internal(err.to_string()))?;
        tokio::fs::write(&metadata_path, metadata_bytes).await?;

        let commit_message = req
            .message
            .clone()
            .unwrap_or_else(|| format!("chore: start work on {}", req.branch_name));
        self.git(&["add", "branch-workflow.json"]).await?;
        let committed = self.git(&["commit", "-m", &commit_message]).await.is_ok();

        let has_origin = self.git(&["remote", "get-url", "origin"]).await.is_ok();
        let mut pushed = false;
        if req.push && has_origin {
            self.git(&["push", "-u", "origin", &req.branch_name]).await?;
            pushed = true;
        }

        tracing::info!("🌿 branch workflow on {}", req.branch_name);
        Ok(BranchWorkflowOutcome {
            branch: req.branch_name.clone(),
            created: !exists,
            committed,
            pushed,
            commit_message,
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String, OpError> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.cfg.workspace_root)
            .output()
            .await?;
        if !output.status.success() {
            return Err(OpError::Internal(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn read_manifest(&self) -> Option<serde_json::Value> {
        let bytes = tokio::fs::read(self.cfg.workspace_root.join("package.json"))
            .await
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn workspace_has(&self, name: &str) -> bool {
        tokio::fs::metadata(self.cfg.workspace_root.join(name))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ops() -> (tempfile::TempDir, Arc<Config>, SystemOps) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(Config::new(dir.path().to_path_buf()).unwrap());
        let backups = Arc::new(BackupStore::new(cfg.backup_dir(), cfg.backup_retention));
        let system = SystemOps::new(cfg.clone(), backups);
        (dir, cfg, system)
    }

    async fn git_in(root: &std::path::Path, args: &[&str]) {
        let status = tokio::process::Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .await
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    #[tokio::test]
    async fn health_reports_the_policy_inventory() {
        let (_dir, cfg, system) = ops().await;
        let report = system.health().await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.critical_files, cfg.critical_files);
        assert_eq!(report.backup_count, 0);
    }

    #[tokio::test]
    async fn analyze_detects_react_and_suggests_missing_pieces() {
        let (_dir, cfg, system) = ops().await;
        tokio::fs::write(
            cfg.workspace_root.join("package.json"),
            br#"{"dependencies":{"react":"^18.0.0"}}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(cfg.workspace_root.join("tsconfig.json"), b"{}")
            .await
            .unwrap();

        let analysis = system.analyze().await.unwrap();
        assert_eq!(analysis.project_type, "react");
        assert!(analysis.features.contains(&"typescript".to_string()));
        assert!(analysis
            .suggestions
            .iter()
            .any(|s| s.contains("README.md")));
    }

    #[tokio::test]
    async fn project_meta_returns_env_names_but_never_values() {
        let (_dir, cfg, system) = ops().await;
        tokio::fs::write(
            cfg.workspace_root.join(".env"),
            b"# comment\nAPI_KEY=super-secret\nPORT=3000\n",
        )
        .await
        .unwrap();

        let meta = system.project_meta().await.unwrap();
        assert_eq!(meta.env_var_names, vec!["API_KEY", "PORT"]);
        let serialized = serde_json::to_string(&meta).unwrap();
        assert!(!serialized.contains("super-secret"));
    }

    #[tokio::test]
    async fn branch_workflow_rejects_bad_names() {
        let (_dir, _cfg, system) = ops().await;
        let err = system
            .branch_workflow(&BranchWorkflowRequest {
                branch_name: "feat; rm -rf /".to_string(),
                push: false,
                message: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn branch_workflow_creates_commits_and_skips_push_without_origin() {
        let (_dir, cfg, system) = ops().await;
        let root = cfg.workspace_root.clone();
        git_in(&root, &["init", "-q", "-b", "main"]).await;
        git_in(&root, &["config", "user.email", "agent@example.com"]).await;
        git_in(&root, &["config", "user.name", "Agent"]).await;
        tokio::fs::write(root.join("README.md"), b"seed").await.unwrap();
        git_in(&root, &["add", "README.md"]).await;
        git_in(&root, &["commit", "-q", "-m", "seed"]).await;

        let outcome = system
            .branch_workflow(&BranchWorkflowRequest {
                branch_name: "feature/login-form".to_string(),
                push: true,
                message: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.branch, "feature/login-form");
        assert!(outcome.created);
        assert!(outcome.committed);
        assert!(!outcome.pushed);
        assert!(root.join("branch-workflow.json").exists());

        // running again on the same branch checks it out instead of creating
        let again = system
            .branch_workflow(&BranchWorkflowRequest {
                branch_name: "feature/login-form".to_string(),
                push: false,
                message: Some("chore: revisit".to_string()),
            })
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.commit_message, "chore: revisit");
    }
}
