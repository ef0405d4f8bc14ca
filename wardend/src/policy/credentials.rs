// ABOUTME: the credential predicate: basenames that must never cross the wire.
// ABOUTME: independent of path classification; checked on read, create, update, and listing.

use crate::config::Config;

/// True when the basename matches a literal credential name or any
/// configured credential pattern. A positive result blocks read, create,
/// and update regardless of how the path classified, and hides the entry
/// from listings unless the caller opts in.
pub fn is_credential(cfg: &Config, basename: &str) -> bool {
    if cfg.credential_names.iter().any(|n| n == basename) {
        return true;
    }
    cfg.credential_patterns
        .iter()
        .any(|re| re.is_match(basename))
}
