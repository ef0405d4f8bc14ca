// ABOUTME: the versioned backup store: integrity-checked snapshots with bounded retention.
// ABOUTME: sole owner of the backup directory; reconstructible from directory enumeration alone.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use warden_common::PathLevel;

use crate::error::OpError;
use crate::policy::ClassifiedPath;

const BACKUP_SUFFIX: &str = ".backup";
const META_SUFFIX: &str = ".backup.meta";

/// Sidecar written next to every snapshot blob. The md5 is the integrity
/// witness for the bytes at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackupMeta {
    pub original_path: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub level: PathLevel,
    pub md5: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackupInfo {
    pub name: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

pub struct BackupStore {
    root: PathBuf,
    retention: usize,
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BackupStore {
    pub fn new(root: PathBuf, retention: usize) -> Self {
        Self {
            root,
            retention,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Copies the pre-mutation bytes into the store and writes the meta
    /// sidecar. Returns `None` when the file does not exist yet; the caller
    /// treats that as nothing to protect. Snapshots of the same basename are
    /// serialized so retention cleanup always runs on a consistent view.
    pub async fn snapshot(
        &self,
        classified: &ClassifiedPath,
        context: &str,
    ) -> Result<Option<PathBuf>, OpError> {
        let lock = self.lock_for(&classified.basename);
        let _guard = lock.lock().await;

        let bytes = match tokio::fs::read(&classified.absolute).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(OpError::Backup {
                    path: classified.relative.clone(),
                    reason: err.to_string(),
                })
            }
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| OpError::Backup {
                path: classified.relative.clone(),
                reason: format!("create backup directory: {err}"),
            })?;

        let timestamp = Utc::now();
        let stamp = timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .replace(':', "-");
        let name = format!("{}.{}.{}{}", classified.basename, context, stamp, BACKUP_SUFFIX);
        let blob_path = self.root.join(&name);

        let meta = BackupMeta {
            original_path: classified.relative.clone(),
            context: context.to_string(),
            timestamp,
            size: bytes.len() as u64,
            level: classified.decision.level,
            md5: format!("{:x}", md5::compute(&bytes)),
        };

        tokio::fs::write(&blob_path, &bytes)
            .await
            .map_err(|err| OpError::Backup {
                path: classified.relative.clone(),
                reason: err.to_string(),
            })?;

        let meta_path = self.root.join(format!(
            "{}.{}.{}{}",
            classified.basename, context, stamp, META_SUFFIX
        ));
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|err| OpError::Backup {
            path: classified.relative.clone(),
            reason: err.to_string(),
        })?;
        tokio::fs::write(&meta_path, meta_json)
            .await
            .map_err(|err| OpError::Backup {
                path: classified.relative.clone(),
                reason: err.to_string(),
            })?;

        self.enforce_retention(&classified.basename).await?;

        tracing::debug!(backup = %name, "snapshot written");
        Ok(Some(blob_path))
    }

    /// All snapshots in the store, newest first.
    pub async fn list_all(&self) -> Result<Vec<BackupInfo>, OpError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(OpError::Io(err)),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(BACKUP_SUFFIX) || name.ends_with(META_SUFFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            entries.push(BackupInfo {
                name,
                size: meta.len(),
                created: meta.created().ok().map(DateTime::<Utc>::from),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    pub async fn count(&self) -> usize {
        self.list_all().await.map(|v| v.len()).unwrap_or(0)
    }

    fn lock_for(&self, basename: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("backup lock map");
        locks
            .entry(basename.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Keeps the newest `retention` snapshots per basename, dropping older
    /// blobs together with their sidecars.
    async fn enforce_retention(&self, basename: &str) -> Result<(), OpError> {
        let prefix = format!("{basename}.");
        let mut snapshots = Vec::new();

        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&prefix)
                || !name.ends_with(BACKUP_SUFFIX)
                || name.ends_with(META_SUFFIX)
            {
                continue;
            }
            let modified = entry.metadata().await?.modified().ok();
            snapshots.push((name, modified));
        }

        // modification time descending; names break ties lexically so the
        // newest-by-stamp entry survives equal mtimes
        snapshots.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        for (name, _) in snapshots.into_iter().skip(self.retention) {
            let blob = self.root.join(&name);
            let meta = self.root.join(format!(
                "{}{}",
                name.trim_end_matches(BACKUP_SUFFIX),
                META_SUFFIX
            ));
            let _ = tokio::fs::remove_file(&blob).await;
            let _ = tokio::fs::remove_file(&meta).await;
            tracing::debug!(backup = %name, "retention dropped snapshot");
        }
        Ok(())
    }
}
