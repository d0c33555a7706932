use std::path::{Path, PathBuf};

/// Name of the sovereign-state directory under the caller's home directory.
pub const SOVEREIGN_DIR_NAME: &str = ".xi-io";

/// Per-workspace runtime directory holding config and caches.
pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".xi")
}

/// The sovereign-state directory: `<home>/.xi-io`. Honors `HOME`; falls back
/// to the current directory when `HOME` is unset (matches the teacher's
/// `runtime_dir` fallback posture rather than panicking on a missing env var).
pub fn sovereign_dir() -> PathBuf {
    home_dir().join(SOVEREIGN_DIR_NAME)
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn ledger_path() -> PathBuf {
    sovereign_dir().join("production_ledger.json")
}

pub fn ledger_backups_dir() -> PathBuf {
    sovereign_dir().join("ledger_backups")
}

pub fn workspaces_registry_path() -> PathBuf {
    sovereign_dir().join("workspaces.json")
}

pub fn payload_trace_log() -> PathBuf {
    sovereign_dir().join("payload_trace.log")
}

pub fn cli_diagnostic_log() -> PathBuf {
    sovereign_dir().join("cli_diagnostic.log")
}

/// Lockfile location: under the workspace root, falling back to the
/// sovereign-state directory if the workspace root is not writable.
pub fn lock_path(workspace: &Path) -> PathBuf {
    workspace.join(".xi-lock")
}

pub fn lock_path_fallback() -> PathBuf {
    sovereign_dir().join(".xi-lock")
}

/// Expand a leading `~` to the caller's home directory. Does not touch any
/// other component of the path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    if path == "~" {
        return home_dir();
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_rewrites_leading_slash_form() {
        std::env::set_var("HOME", "/home/operator");
        assert_eq!(expand_tilde("~/work/proj"), PathBuf::from("/home/operator/work/proj"));
    }

    #[test]
    fn expand_tilde_rewrites_bare_tilde() {
        std::env::set_var("HOME", "/home/operator");
        assert_eq!(expand_tilde("~"), PathBuf::from("/home/operator"));
    }

    #[test]
    fn expand_tilde_leaves_other_paths_untouched() {
        assert_eq!(expand_tilde("/etc/passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn sovereign_dir_name_matches_glossary() {
        assert_eq!(SOVEREIGN_DIR_NAME, ".xi-io");
    }
}
