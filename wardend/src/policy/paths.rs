// ABOUTME: pure path classification: workspace confinement plus a layered allow/deny model.
// ABOUTME: the project allowlist is checked before the protected-directory denylist on purpose.

use std::path::{Component, Path, PathBuf};

use warden_common::PathLevel;

use crate::config::Config;
use crate::error::OpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    pub level: PathLevel,
    pub allowed: bool,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ClassifiedPath {
    pub absolute: PathBuf,
    /// Workspace-relative, forward-slash form used for pattern matching.
    pub relative: String,
    pub basename: String,
    pub decision: PathDecision,
}

impl ClassifiedPath {
    pub fn is_protected(&self, cfg: &Config) -> bool {
        cfg.is_protected_file(&self.basename)
    }

    /// Mutations of system files and protected files must snapshot first.
    pub fn requires_snapshot(&self, cfg: &Config) -> bool {
        self.decision.level == PathLevel::SystemFile || self.is_protected(cfg)
    }
}

/// Resolves a caller-supplied path against the workspace root without
/// touching the filesystem, so paths that do not exist yet still classify.
/// Any resolved path outside the workspace fails with `PathTraversal`.
pub fn resolve_in_workspace(cfg: &Config, raw: &str) -> Result<(PathBuf, String), OpError> {
    let candidate = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        cfg.workspace_root.join(raw)
    };

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(OpError::PathTraversal(raw.to_string()));
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    let relative = normalized
        .strip_prefix(&cfg.workspace_root)
        .map_err(|_| OpError::PathTraversal(raw.to_string()))?
        .to_string_lossy()
        .replace('\\', "/");

    Ok((normalized, relative))
}

/// Pure classification of one path. Rule order is part of the contract:
/// critical basename, then the project allowlist, then the protected
/// directory prefixes, and everything left is a system file.
pub fn classify(cfg: &Config, raw: &str) -> Result<ClassifiedPath, OpError> {
    let (absolute, relative) = resolve_in_workspace(cfg, raw)?;
    let basename = absolute
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let decision = if cfg.is_critical_file(&basename) {
        PathDecision {
            level: PathLevel::Critical,
            allowed: false,
            reason: "Critical system file cannot be modified".to_string(),
        }
    } else if cfg
        .project_path_patterns
        .iter()
        .any(|re| re.is_match(&relative))
    {
        PathDecision {
            level: PathLevel::ProjectFile,
            allowed: true,
            reason: "matches an allowed project path".to_string(),
        }
    } else if let Some(dir) = protected_directory_prefix(cfg, &relative) {
        PathDecision {
            level: PathLevel::SystemDirectory,
            allowed: false,
            reason: format!("{dir} is a protected directory"),
        }
    } else {
        PathDecision {
            level: PathLevel::SystemFile,
            allowed: true,
            reason: "system file requires careful handling".to_string(),
        }
    };

    Ok(ClassifiedPath {
        absolute,
        relative,
        basename,
        decision,
    })
}

fn protected_directory_prefix<'a>(cfg: &'a Config, relative: &str) -> Option<&'a str> {
    cfg.protected_directories
        .iter()
        .map(|d| d.as_str())
        .find(|dir| relative == *dir || relative.starts_with(&format!("{dir}/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path().to_path_buf()).unwrap();
        (dir, cfg)
    }

    #[test]
    fn classify_rejects_traversal_out_of_workspace() {
        let (_dir, cfg) = cfg();
        let err = classify(&cfg, "../outside.txt").unwrap_err();
        assert!(matches!(err, OpError::PathTraversal(_)));
    }

    #[test]
    fn classify_rejects_absolute_path_outside_workspace() {
        let (_dir, cfg) = cfg();
        let err = classify(&cfg, "/etc/passwd").unwrap_err();
        assert!(matches!(err, OpError::PathTraversal(_)));
    }

    #[test]
    fn classify_allows_traversal_that_stays_inside() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "src/../src/main.ts").unwrap();
        assert_eq!(classified.relative, "src/main.ts");
        assert_eq!(classified.decision.level, PathLevel::ProjectFile);
    }

    #[test]
    fn classify_marks_critical_basename_anywhere() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "nested/warden.config.json").unwrap();
        assert_eq!(classified.decision.level, PathLevel::Critical);
        assert!(!classified.decision.allowed);
        assert!(classified.decision.reason.contains("Critical"));
    }

    #[test]
    fn classify_project_allowlist_wins_over_protected_directory() {
        let (_dir, cfg) = cfg();
        // .json extension sits on the project allowlist even under node_modules
        let classified = classify(&cfg, "node_modules/pkg/package.json").unwrap();
        assert_eq!(classified.decision.level, PathLevel::ProjectFile);
        assert!(classified.decision.allowed);
    }

    #[test]
    fn classify_denies_protected_directory_descendants() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, ".git/objects/ab/cdef").unwrap();
        assert_eq!(classified.decision.level, PathLevel::SystemDirectory);
        assert!(!classified.decision.allowed);
        assert!(classified.decision.reason.contains(".git"));
    }

    #[test]
    fn classify_defaults_to_system_file() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "server.py").unwrap();
        assert_eq!(classified.decision.level, PathLevel::SystemFile);
        assert!(classified.decision.allowed);
        assert!(classified.requires_snapshot(&cfg));
    }

    #[test]
    fn project_files_do_not_force_snapshots() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "src/App.tsx").unwrap();
        assert!(!classified.requires_snapshot(&cfg));
    }

    #[test]
    fn protected_basenames_force_snapshots_even_as_project_files() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "package.json").unwrap();
        assert_eq!(classified.decision.level, PathLevel::ProjectFile);
        assert!(classified.is_protected(&cfg));
        assert!(classified.requires_snapshot(&cfg));
    }

    #[test]
    fn similar_directory_names_are_not_prefix_matches() {
        let (_dir, cfg) = cfg();
        let classified = classify(&cfg, "node_modules_backup/data.bin").unwrap();
        assert_eq!(classified.decision.level, PathLevel::SystemFile);
    }
}
