// ABOUTME: enforces allow/deny policies over paths and commands before anything executes.
// ABOUTME: classification is pure; the daemon stays deterministic and auditable under agent mistakes.

pub mod commands;
pub mod credentials;
pub mod paths;

pub use commands::CommandPolicy;
pub use paths::{classify, resolve_in_workspace, ClassifiedPath, PathDecision};
