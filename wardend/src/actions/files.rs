// ABOUTME: the five file operations; every mutation runs classify, credential check,
// ABOUTME: existence check, snapshot, then write, in that order, refusing early on failure.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use warden_common::{
    CreateFileRequest, DeleteFileOutcome, DeleteFileRequest, DirEntry, DirEntryKind,
    ListDirOutcome, ListDirRequest, PathLevel, ReadFileOutcome, ReadFileRequest,
    UpdateFileRequest, WriteFileOutcome,
};

use crate::backup::BackupStore;
use crate::config::Config;
use crate::error::OpError;
use crate::policy::{classify, credentials, resolve_in_workspace, ClassifiedPath};

pub struct FileOps {
    cfg: Arc<Config>,
    backups: Arc<BackupStore>,
}

impl FileOps {
    pub fn new(cfg: Arc<Config>, backups: Arc<BackupStore>) -> Self {
        Self { cfg, backups }
    }

    pub async fn create(&self, req: &CreateFileRequest) -> Result<WriteFileOutcome, OpError> {
        let classified = classify(&self.cfg, &req.file_path)?;
        ensure_mutable(&classified)?;
        ensure_not_credential(&self.cfg, &classified)?;

        let exists = tokio::fs::metadata(&classified.absolute).await.is_ok();
        if exists && !req.overwrite {
            return Err(OpError::Exists(classified.relative.clone()));
        }

        // overwriting an existing file always snapshots, whatever its level
        let backup_path = if exists {
            self.backups
                .snapshot(&classified, "create-overwrite")
                .await?
        } else {
            None
        };

        if let Some(parent) = classified.absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&classified.absolute, req.content.as_bytes()).await?;

        tracing::info!("📝 created {}", classified.relative);
        Ok(WriteFileOutcome {
            path: classified.relative.clone(),
            bytes_written: req.content.len() as u64,
            backup_path: backup_path.map(|p| p.to_string_lossy().to_string()),
            level: classified.decision.level,
        })
    }

    pub async fn update(&self, req: &UpdateFileRequest) -> Result<WriteFileOutcome, OpError> {
        let classified = classify(&self.cfg, &req.file_path)?;
        ensure_mutable(&classified)?;
        ensure_not_credential(&self.cfg, &classified)?;

        if tokio::fs::metadata(&classified.absolute).await.is_err() {
            return Err(OpError::Missing(classified.relative.clone()));
        }

        // the caller's flag widens the snapshot set, never narrows it
        let should_snapshot = req.create_backup || classified.requires_snapshot(&self.cfg);
        let backup_path = if should_snapshot {
            self.backups.snapshot(&classified, "update").await?
        } else {
            None
        };

        tokio::fs::write(&classified.absolute, req.content.as_bytes()).await?;

        tracing::info!("✏️ updated {}", classified.relative);
        Ok(WriteFileOutcome {
            path: classified.relative.clone(),
            bytes_written: req.content.len() as u64,
            backup_path: backup_path.map(|p| p.to_string_lossy().to_string()),
            level: classified.decision.level,
        })
    }

    pub async fn delete(&self, req: &DeleteFileRequest) -> Result<DeleteFileOutcome, OpError> {
        let classified = classify(&self.cfg, &req.file_path)?;
        ensure_mutable(&classified)?;

        if tokio::fs::metadata(&classified.absolute).await.is_err() {
            return Err(OpError::Missing(classified.relative.clone()));
        }
        if classified.is_protected(&self.cfg) && !req.force {
            return Err(OpError::Protected(classified.relative.clone()));
        }

        let backup_path = self.backups.snapshot(&classified, "delete").await?;
        tokio::fs::remove_file(&classified.absolute).await?;

        tracing::info!("🗑 deleted {}", classified.relative);
        Ok(DeleteFileOutcome {
            path: classified.relative.clone(),
            backup_path: backup_path.map(|p| p.to_string_lossy().to_string()),
        })
    }

    pub async fn read(&self, req: &ReadFileRequest) -> Result<ReadFileOutcome, OpError> {
        let classified = classify(&self.cfg, &req.file_path)?;
        if classified.decision.level == PathLevel::SystemDirectory {
            return Err(OpError::SystemDirectory(classified.decision.reason.clone()));
        }
        ensure_not_credential(&self.cfg, &classified)?;

        let meta = match tokio::fs::metadata(&classified.absolute).await {
            Ok(meta) => meta,
            Err(_) => return Err(OpError::Missing(classified.relative.clone())),
        };
        if meta.len() > self.cfg.max_read_bytes {
            return Err(OpError::TooLarge {
                path: classified.relative.clone(),
                size: meta.len(),
                limit: self.cfg.max_read_bytes,
            });
        }

        let bytes = tokio::fs::read(&classified.absolute).await?;
        Ok(ReadFileOutcome {
            path: classified.relative.clone(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            level: classified.decision.level,
            protected: classified.is_protected(&self.cfg),
            credential: false,
        })
    }

    pub async fn list(&self, req: &ListDirRequest) -> Result<ListDirOutcome, OpError> {
        let (absolute, relative) = resolve_in_workspace(&self.cfg, &req.dir_path)?;

        let meta = match tokio::fs::metadata(&absolute).await {
            Ok(meta) => meta,
            Err(_) => return Err(OpError::Missing(display_dir(&relative))),
        };
        if !meta.is_dir() {
            return Err(OpError::NotDirectory(relative));
        }

        let mut entries = Vec::new();
        let mut pending = vec![absolute];
        while let Some(dir) = pending.pop() {
            let mut reader = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                let hidden = name.starts_with('.');
                if hidden && !req.include_hidden {
                    continue;
                }
                let credential = credentials::is_credential(&self.cfg, &name);
                if credential && !req.include_credentials {
                    continue;
                }

                let meta = entry.metadata().await?;
                let entry_rel = entry
                    .path()
                    .strip_prefix(&self.cfg.workspace_root)
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_else(|_| name.clone());

                if meta.is_dir() {
                    if req.recursive {
                        pending.push(entry.path());
                    }
                    entries.push(DirEntry {
                        name,
                        path: entry_rel,
                        kind: DirEntryKind::Directory,
                        size: None,
                        modified: meta.modified().ok().map(DateTime::<Utc>::from),
                        hidden,
                        credential,
                    });
                } else {
                    entries.push(DirEntry {
                        name,
                        path: entry_rel,
                        kind: DirEntryKind::File,
                        size: Some(meta.len()),
                        modified: meta.modified().ok().map(DateTime::<Utc>::from),
                        hidden,
                        credential,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("📁 {} entries under {}", entries.len(), display_dir(&relative));
        Ok(ListDirOutcome {
            path: relative,
            total: entries.len(),
            entries,
        })
    }
}

fn display_dir(relative: &str) -> String {
    if relative.is_empty() {
        ".".to_string()
    } else {
        relative.to_string()
    }
}

fn ensure_mutable(classified: &ClassifiedPath) -> Result<(), OpError> {
    if classified.decision.allowed {
        return Ok(());
    }
    match classified.decision.level {
        PathLevel::Critical => Err(OpError::Critical(classified.decision.reason.clone())),
        PathLevel::SystemDirectory => {
            Err(OpError::SystemDirectory(classified.decision.reason.clone()))
        }
        _ => Err(OpError::InvalidRequest(classified.decision.reason.clone())),
    }
}

fn ensure_not_credential(cfg: &Config, classified: &ClassifiedPath) -> Result<(), OpError> {
    if credentials::is_credential(cfg, &classified.basename) {
        return Err(OpError::Credential(classified.relative.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ops() -> (tempfile::TempDir, Arc<Config>, FileOps) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(Config::new(dir.path().to_path_buf()).unwrap());
        let backups = Arc::new(BackupStore::new(cfg.backup_dir(), cfg.backup_retention));
        let file_ops = FileOps::new(cfg.clone(), backups);
        (dir, cfg, file_ops)
    }

    fn create_req(path: &str, content: &str, overwrite: bool) -> CreateFileRequest {
        CreateFileRequest {
            file_path: path.to_string(),
            content: content.to_string(),
            overwrite,
        }
    }

    #[tokio::test]
    async fn create_writes_through_missing_parents() {
        let (_dir, cfg, ops) = ops().await;
        let outcome = ops
            .create(&create_req("src/components/Button.tsx", "export {}", false))
            .await
            .unwrap();
        assert_eq!(outcome.level, PathLevel::ProjectFile);
        assert!(outcome.backup_path.is_none());
        let written =
            tokio::fs::read_to_string(cfg.workspace_root.join("src/components/Button.tsx"))
                .await
                .unwrap();
        assert_eq!(written, "export {}");
    }

    #[tokio::test]
    async fn create_without_overwrite_refuses_existing_target() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("src/App.txt", "A", false)).await.unwrap();
        let err = ops
            .create(&create_req("src/App.txt", "B", false))
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Exists(_)));
    }

    #[tokio::test]
    async fn create_overwrite_snapshots_the_old_bytes() {
        let (_dir, cfg, ops) = ops().await;
        ops.create(&create_req("src/App.txt", "A", false)).await.unwrap();
        let outcome = ops
            .create(&create_req("src/App.txt", "B", true))
            .await
            .unwrap();

        let backup_path = outcome.backup_path.expect("overwrite snapshots");
        assert!(backup_path.contains("App.txt.create-overwrite."));
        let old = tokio::fs::read(&backup_path).await.unwrap();
        assert_eq!(old, b"A");
        let new = tokio::fs::read(cfg.workspace_root.join("src/App.txt"))
            .await
            .unwrap();
        assert_eq!(new, b"B");

        let meta: crate::backup::BackupMeta = serde_json::from_slice(
            &tokio::fs::read(format!("{backup_path}.meta")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(meta.md5, format!("{:x}", md5::compute(b"A")));
    }

    #[tokio::test]
    async fn update_of_missing_file_fails() {
        let (_dir, _cfg, ops) = ops().await;
        let err = ops
            .update(&UpdateFileRequest {
                file_path: "src/Ghost.tsx".to_string(),
                content: "x".to_string(),
                create_backup: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Missing(_)));
    }

    #[tokio::test]
    async fn update_snapshots_system_files_even_when_caller_opts_out() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("server.py", "v1", false)).await.unwrap();
        let outcome = ops
            .update(&UpdateFileRequest {
                file_path: "server.py".to_string(),
                content: "v2".to_string(),
                create_backup: false,
            })
            .await
            .unwrap();
        assert!(outcome.backup_path.is_some());
    }

    #[tokio::test]
    async fn update_of_project_file_without_backup_flag_skips_snapshot() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("src/App.tsx", "v1", false)).await.unwrap();
        let outcome = ops
            .update(&UpdateFileRequest {
                file_path: "src/App.tsx".to_string(),
                content: "v2".to_string(),
                create_backup: false,
            })
            .await
            .unwrap();
        assert!(outcome.backup_path.is_none());
    }

    #[tokio::test]
    async fn critical_files_refuse_mutation_and_keep_their_bytes() {
        let (_dir, cfg, ops) = ops().await;
        tokio::fs::write(cfg.workspace_root.join("warden.config.json"), b"cfg")
            .await
            .unwrap();
        let err = ops
            .update(&UpdateFileRequest {
                file_path: "warden.config.json".to_string(),
                content: "pwned".to_string(),
                create_backup: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Critical(_)));
        let bytes = tokio::fs::read(cfg.workspace_root.join("warden.config.json"))
            .await
            .unwrap();
        assert_eq!(bytes, b"cfg");
    }

    #[tokio::test]
    async fn critical_files_remain_readable() {
        let (_dir, cfg, ops) = ops().await;
        tokio::fs::write(cfg.workspace_root.join("warden.config.json"), b"cfg")
            .await
            .unwrap();
        let outcome = ops
            .read(&ReadFileRequest {
                file_path: "warden.config.json".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.level, PathLevel::Critical);
        assert_eq!(
            outcome.content_base64,
            base64::engine::general_purpose::STANDARD.encode(b"cfg")
        );
    }

    #[tokio::test]
    async fn credential_files_refuse_read_create_update() {
        let (_dir, cfg, ops) = ops().await;
        tokio::fs::write(cfg.workspace_root.join(".env"), b"KEY=value")
            .await
            .unwrap();

        let read_err = ops
            .read(&ReadFileRequest {
                file_path: ".env".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(read_err, OpError::Credential(_)));

        let create_err = ops
            .create(&create_req("api-token.json", "{}", false))
            .await
            .unwrap_err();
        assert!(matches!(create_err, OpError::Credential(_)));

        let update_err = ops
            .update(&UpdateFileRequest {
                file_path: ".env".to_string(),
                content: "KEY=other".to_string(),
                create_backup: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(update_err, OpError::Credential(_)));
    }

    #[tokio::test]
    async fn delete_requires_force_for_protected_files() {
        let (_dir, cfg, ops) = ops().await;
        tokio::fs::write(cfg.workspace_root.join("package.json"), b"{}")
            .await
            .unwrap();

        let err = ops
            .delete(&DeleteFileRequest {
                file_path: "package.json".to_string(),
                force: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Protected(_)));

        let outcome = ops
            .delete(&DeleteFileRequest {
                file_path: "package.json".to_string(),
                force: true,
            })
            .await
            .unwrap();
        assert!(outcome.backup_path.is_some());
        assert!(tokio::fs::metadata(cfg.workspace_root.join("package.json"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn delete_always_snapshots_first() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("src/App.tsx", "bytes", false))
            .await
            .unwrap();
        let outcome = ops
            .delete(&DeleteFileRequest {
                file_path: "src/App.tsx".to_string(),
                force: false,
            })
            .await
            .unwrap();
        let backup = outcome.backup_path.expect("delete snapshots");
        let bytes = tokio::fs::read(&backup).await.unwrap();
        assert_eq!(bytes, b"bytes");
    }

    #[tokio::test]
    async fn read_enforces_the_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(dir.path().to_path_buf()).unwrap();
        cfg.max_read_bytes = 8;
        let cfg = Arc::new(cfg);
        let backups = Arc::new(BackupStore::new(cfg.backup_dir(), cfg.backup_retention));
        let ops = FileOps::new(cfg.clone(), backups);

        tokio::fs::write(cfg.workspace_root.join("big.txt"), b"0123456789")
            .await
            .unwrap();
        let err = ops
            .read(&ReadFileRequest {
                file_path: "big.txt".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn read_returns_bytes_and_flags() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("README.md", "hello", false)).await.unwrap();
        let outcome = ops
            .read(&ReadFileRequest {
                file_path: "README.md".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            outcome.content_base64,
            base64::engine::general_purpose::STANDARD.encode(b"hello")
        );
        assert_eq!(outcome.size, 5);
        assert!(!outcome.protected);
    }

    #[tokio::test]
    async fn list_hides_credentials_and_hidden_files_by_default() {
        let (_dir, cfg, ops) = ops().await;
        tokio::fs::write(cfg.workspace_root.join(".env"), b"secret")
            .await
            .unwrap();
        tokio::fs::write(cfg.workspace_root.join(".hidden"), b"x")
            .await
            .unwrap();
        tokio::fs::write(cfg.workspace_root.join("visible.txt"), b"x")
            .await
            .unwrap();

        let outcome = ops
            .list(&ListDirRequest {
                dir_path: ".".to_string(),
                recursive: false,
                include_hidden: false,
                include_credentials: false,
            })
            .await
            .unwrap();
        let names: Vec<&str> = outcome.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["visible.txt"]);

        let opted_in = ops
            .list(&ListDirRequest {
                dir_path: ".".to_string(),
                recursive: false,
                include_hidden: true,
                include_credentials: true,
            })
            .await
            .unwrap();
        assert_eq!(opted_in.total, 3);
        assert!(opted_in
            .entries
            .iter()
            .any(|e| e.name == ".env" && e.credential));
    }

    #[tokio::test]
    async fn list_recursive_walks_subdirectories() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("src/a.ts", "a", false)).await.unwrap();
        ops.create(&create_req("src/nested/b.ts", "b", false))
            .await
            .unwrap();

        let outcome = ops
            .list(&ListDirRequest {
                dir_path: "src".to_string(),
                recursive: true,
                include_hidden: false,
                include_credentials: false,
            })
            .await
            .unwrap();
        let paths: Vec<&str> = outcome.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/nested", "src/nested/b.ts"]);
    }

    #[tokio::test]
    async fn list_of_file_is_not_directory() {
        let (_dir, _cfg, ops) = ops().await;
        ops.create(&create_req("src/a.ts", "a", false)).await.unwrap();
        let err = ops
            .list(&ListDirRequest {
                dir_path: "src/a.ts".to_string(),
                recursive: false,
                include_hidden: false,
                include_credentials: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::NotDirectory(_)));
    }

    #[tokio::test]
    async fn traversal_is_refused_everywhere() {
        let (_dir, _cfg, ops) = ops().await;
        let err = ops
            .read(&ReadFileRequest {
                file_path: "../../etc/passwd".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::PathTraversal(_)));
    }
}
