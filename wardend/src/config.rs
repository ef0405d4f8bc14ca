// ABOUTME: holds the policy tables and runtime limits the daemon enforces.
// ABOUTME: everything here is configuration, read from the environment with safe defaults.

use std::path::PathBuf;

use anyhow::Context;
use regex::Regex;

pub const DEFAULT_PORT: u16 = 3001;
pub const BACKUP_DIR_NAME: &str = ".file-backups";

const DEFAULT_CRITICAL_FILES: &[&str] = &["warden.config.json", "wardend.lock"];

const DEFAULT_PROTECTED_DIRECTORIES: &[&str] =
    &[".git", "node_modules", ".file-backups", ".warden"];

const DEFAULT_PROTECTED_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".gitignore",
    "Dockerfile",
    "docker-compose.yml",
];

const DEFAULT_CREDENTIAL_NAMES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    "credentials.json",
    "service-account.json",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
];

const CREDENTIAL_PATTERNS: &[&str] = &[
    r"(?i)secret",
    r"(?i)password",
    r"(?i)token",
    r"(?i)\.(pem|p12|pfx)$",
];

/// Anchored against the workspace-relative, forward-slash path. Checked
/// before the protected-directory prefixes, so a configured project path
/// wins even when it sits below a broader protected entry.
const PROJECT_PATH_PATTERNS: &[&str] = &[
    r"^src(/.*)?$",
    r"^components(/.*)?$",
    r"^app(/.*)?$",
    r"^pages(/.*)?$",
    r"^lib(/.*)?$",
    r"^styles(/.*)?$",
    r"^public(/.*)?$",
    r"^config(/.*)?$",
    r"^middleware(/.*)?$",
    r"^models(/.*)?$",
    r"^routes(/.*)?$",
    r"^services(/.*)?$",
    r"^controllers(/.*)?$",
    r"^hooks(/.*)?$",
    r"^types(/.*)?$",
    r"^docs(/.*)?$",
    r"^__tests__(/.*)?$",
    r"^tsconfig\.json$",
    r"^tailwind\.config\.[\w.]+$",
    r"^next\.config\.[\w.]+$",
    r"^vite\.config\.[\w.]+$",
    r"^\.eslintrc(\.[\w]+)?$",
    r"^\.prettierrc[\w.]*$",
    r"^jest\.config\.[\w.]+$",
    r"^postcss\.config\.[\w.]+$",
    r"^babel\.config\.[\w.]+$",
    r"^.*\.(md|txt|json)$",
];

const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "USER", "NODE_ENV", "TZ", "LANG", "LC_ALL", "PWD", "TMPDIR", "TEMP", "TMP",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub critical_files: Vec<String>,
    pub protected_directories: Vec<String>,
    pub protected_files: Vec<String>,
    pub credential_names: Vec<String>,
    pub credential_patterns: Vec<Regex>,
    pub project_path_patterns: Vec<Regex>,
    pub safe_env_vars: Vec<String>,
    /// Variables whose name starts with this prefix pass through to children.
    pub agent_env_prefix: String,
    pub max_read_bytes: u64,
    pub backup_retention: usize,
    pub default_timeout_ms: u64,
    pub long_operation_timeout_ms: u64,
    pub post_command_grace_ms: u64,
    pub term_grace_ms: u64,
    pub keep_alive_interval_ms: u64,
}

impl Config {
    pub fn new(workspace_root: PathBuf) -> anyhow::Result<Self> {
        let workspace_root = workspace_root
            .canonicalize()
            .with_context(|| format!("workspace root {} must exist", workspace_root.display()))?;

        Ok(Self {
            workspace_root,
            critical_files: env_list("WARDEND_CRITICAL_FILES", DEFAULT_CRITICAL_FILES),
            protected_directories: env_list(
                "WARDEND_PROTECTED_DIRS",
                DEFAULT_PROTECTED_DIRECTORIES,
            ),
            protected_files: env_list("WARDEND_PROTECTED_FILES", DEFAULT_PROTECTED_FILES),
            credential_names: env_list("WARDEND_CREDENTIAL_NAMES", DEFAULT_CREDENTIAL_NAMES),
            credential_patterns: compile_patterns(CREDENTIAL_PATTERNS)?,
            project_path_patterns: compile_patterns(PROJECT_PATH_PATTERNS)?,
            safe_env_vars: SAFE_ENV_VARS.iter().map(|s| s.to_string()).collect(),
            agent_env_prefix: std::env::var("WARDEND_AGENT_ENV_PREFIX")
                .unwrap_or_else(|_| "WARDEN_".to_string()),
            max_read_bytes: env_u64("WARDEND_MAX_READ_BYTES", 10 * 1024 * 1024),
            backup_retention: env_u64("WARDEND_BACKUP_RETENTION", 10) as usize,
            default_timeout_ms: env_u64("WARDEND_EXEC_TIMEOUT_MS", 30_000),
            long_operation_timeout_ms: env_u64("WARDEND_LONG_EXEC_TIMEOUT_MS", 300_000),
            post_command_grace_ms: env_u64("WARDEND_POST_COMMAND_GRACE_MS", 5_000),
            term_grace_ms: env_u64("WARDEND_TERM_GRACE_MS", 5_000),
            keep_alive_interval_ms: env_u64("WARDEND_KEEP_ALIVE_INTERVAL_MS", 10_000),
        })
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.workspace_root.join(BACKUP_DIR_NAME)
    }

    pub fn is_protected_file(&self, basename: &str) -> bool {
        self.protected_files.iter().any(|p| p == basename)
    }

    pub fn is_critical_file(&self, basename: &str) -> bool {
        self.critical_files.iter().any(|c| c == basename)
    }
}

fn compile_patterns(patterns: &[&str]) -> anyhow::Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid pattern {p}")))
        .collect()
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
