// ABOUTME: pure command classification: a denylist that always wins, then a categorized allowlist.
// ABOUTME: refuses novel syntax outright rather than attempting to parse shell.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{Config, BACKUP_DIR_NAME};
use crate::error::OpError;

static DENY_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\brm\s+-[a-zA-Z]*[rf]", "rm with recursive or force flags"),
        (r"\bsudo\b", "privilege escalation"),
        (r"\bchmod\s+[0-7]{3,4}\b", "chmod with an octal mode"),
        (r"\bchown\b", "ownership changes"),
        (
            r"\b(curl|wget)\b[^|]*\|\s*(ba|z|da)?sh\b",
            "piping a download into a shell",
        ),
        (r">>?\s*/etc/", "writing to /etc"),
        (
            r"\b(tee|cp|mv)\s+(\S+\s+)*/etc/",
            "writing to /etc",
        ),
        (
            r"(^|[\s;&|])(/bin/|/usr/bin/)\S+",
            "direct execution of system binaries",
        ),
        (r"\b(eval|exec|spawn)\s*\(", "dynamic code execution"),
        (r"\.\./\.\./", "path traversal"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("deny pattern"), reason))
    .collect()
});

static ALLOW_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // package managers: install/add/remove/script-run and friends
        r"^(npm|pnpm|yarn)\s+(install|i|ci|add|remove|uninstall|update|audit|outdated|list|ls|test|start|build|run\s+[\w:-]+)(\s+[-@\w^~./:+]+)*$",
        // project generators
        r"^npx\s+create-[\w-]+(@[\w.-]+)?(\s+[-@\w./]+)*$",
        r"^(npm|pnpm|yarn)\s+create\s+[\w-]+(\s+[-@\w./]+)*$",
        // dev tools
        r"^npx\s+[\w-]+(\s+[-@=\w./:]+)*$",
        r"^node\s+[\w./-]+\.js(\s+[-=\w./]+)*$",
        // read-only file operations
        r"^(ls|cat|head|tail|wc|file|stat|tree|which)(\s+[-\w./*'\x22]+)*$",
        r"^(grep|find)(\s+[-\w./*'\x22]+)+$",
        r"^mkdir\s+-p(\s+[\w./-]+)+$",
        r"^(pwd|cd)(\s+[\w./-]+)?$",
        r"^echo(\s+[-\w./*'\x22]+)*$",
        // safe git operations
        r"^git\s+(status|log|diff|show|branch|fetch)(\s+[-\w./=@^~:]+)*$",
        r"^git\s+(add|commit|push|pull|checkout)(\s+[-\w./=@^~:'\x22]+)*$",
        r"^git\s+clone\s+https://[\w./:-]+(\s+[\w./-]+)?$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("allow pattern"))
    .collect()
});

static CD_CHAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cd\s+[\w./-]+\s+&&\s+(.+)$").expect("cd chain pattern"));

/// Compiled command policy. The denylist carries two extra entries derived
/// from configuration: mentions of critical files and of the backup store.
pub struct CommandPolicy {
    dynamic_deny: Vec<(Regex, String)>,
}

impl CommandPolicy {
    pub fn new(cfg: &Config) -> Self {
        let mut dynamic_deny = Vec::new();
        for name in &cfg.critical_files {
            let pattern = Regex::new(&regex::escape(name)).expect("escaped critical name");
            dynamic_deny.push((pattern, format!("references critical file {name}")));
        }
        let backups = Regex::new(&regex::escape(BACKUP_DIR_NAME)).expect("escaped backup dir");
        dynamic_deny.push((backups, "references the backup directory".to_string()));
        Self { dynamic_deny }
    }

    /// Deny precedes allow: a command matching both sets is refused, and a
    /// command matching neither is refused too.
    pub fn classify(&self, command: &str) -> Result<(), OpError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(OpError::InvalidRequest("command must be non-empty".into()));
        }

        for (pattern, reason) in DENY_PATTERNS.iter() {
            if pattern.is_match(command) {
                return Err(OpError::CommandBlocked(reason.to_string()));
            }
        }
        for (pattern, reason) in &self.dynamic_deny {
            if pattern.is_match(command) {
                return Err(OpError::CommandBlocked(reason.clone()));
            }
        }

        self.check_allowed(command)
    }

    fn check_allowed(&self, command: &str) -> Result<(), OpError> {
        if ALLOW_PATTERNS.iter().any(|re| re.is_match(command)) {
            return Ok(());
        }
        // `cd <dir> && <rest>` is allowed when the rest is.
        if let Some(captures) = CD_CHAIN.captures(command) {
            return self.check_allowed(captures.get(1).expect("chain tail").as_str());
        }
        Err(OpError::CommandNotAllowed(command.to_string()))
    }
}
