//! Bounded, pruned, one-filesystem directory walk (spec §4.2).
//!
//! Deliberately hand-rolled rather than built on `ignore`/`walkdir`: neither
//! exposes the device-id one-filesystem guard or literal per-component
//! symlink rejection this component requires, so the stack-based traversal
//! is explicit here. Naming follows `deepseek-index`'s helper-function
//! style (`workspace_file_paths`, `has_ignored_component`) without reusing
//! its crate dependencies.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use xi_core::HIDDEN_SENTINEL;

const PRUNED_DIR_NAMES: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    "dist",
    "build",
    ".pytest_cache",
    ".mypy_cache",
];

const MAX_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    Ok,
    Timeout,
    MaxReached,
    OsError,
}

#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub count: u64,
    pub samples: Vec<PathBuf>,
    pub status: WalkStatus,
}

pub struct WalkLimits {
    pub max_files: u64,
    pub max_time: Duration,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_files: 50_000,
            max_time: Duration::from_millis(3_000),
        }
    }
}

/// Walk `root`, counting and sampling files accepted by `extensions`
/// (`None` accepts every regular file).
pub fn walk(root: &Path, extensions: Option<&BTreeSet<String>>, limits: &WalkLimits) -> WalkOutcome {
    let start = Instant::now();
    let mut count: u64 = 0;
    let mut samples: Vec<PathBuf> = Vec::new();

    let root_dev = match device_id(root) {
        Some(dev) => dev,
        None => {
            return WalkOutcome {
                count: 0,
                samples: Vec::new(),
                status: WalkStatus::OsError,
            }
        }
    };

    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Individual directory permission errors are swallowed; the
            // walk continues with the remaining stack.
            Err(_) => continue,
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };

            let path = entry.path();

            if file_type.is_symlink() {
                continue;
            }

            if file_type.is_dir() {
                if has_pruned_component(&path) {
                    continue;
                }
                match device_id(&path) {
                    Some(dev) if dev == root_dev => stack.push(path),
                    _ => continue,
                }
                continue;
            }

            if !file_type.is_file() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if accepts(&name, extensions) {
                count += 1;
                if samples.len() < MAX_SAMPLES {
                    samples.push(path);
                }
            }

            if count >= limits.max_files {
                return WalkOutcome {
                    count,
                    samples,
                    status: WalkStatus::MaxReached,
                };
            }
            if start.elapsed() >= limits.max_time {
                return WalkOutcome {
                    count,
                    samples,
                    status: WalkStatus::Timeout,
                };
            }
        }

        if start.elapsed() >= limits.max_time {
            return WalkOutcome {
                count,
                samples,
                status: WalkStatus::Timeout,
            };
        }
    }

    WalkOutcome {
        count,
        samples,
        status: WalkStatus::Ok,
    }
}

fn has_pruned_component(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| PRUNED_DIR_NAMES.contains(&name))
        .unwrap_or(false)
}

fn accepts(name: &str, extensions: Option<&BTreeSet<String>>) -> bool {
    let extensions = match extensions {
        None => return true,
        Some(extensions) if extensions.is_empty() => return true,
        Some(extensions) => extensions,
    };

    if extensions.contains(HIDDEN_SENTINEL) && name.starts_with('.') {
        return true;
    }

    let lowered = name.to_lowercase();
    extensions
        .iter()
        .filter(|ext| ext.as_str() != HIDDEN_SENTINEL)
        .any(|ext| lowered.ends_with(&format!(".{ext}")))
}

#[cfg(unix)]
fn device_id(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::symlink_metadata(path).ok().map(|meta| meta.dev())
}

#[cfg(not(unix))]
fn device_id(_path: &Path) -> Option<u64> {
    // No portable device-id probe off Unix; treat every directory as being
    // on the same filesystem rather than refusing to walk at all.
    Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn ext_set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn counts_matching_extension_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("b.py"), "pass").unwrap();
        let outcome = walk(dir.path(), Some(&ext_set(&["rs"])), &WalkLimits::default());
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.status, WalkStatus::Ok);
    }

    #[test]
    fn prunes_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "x").unwrap();
        fs::write(dir.path().join("readme.md"), "hi").unwrap();
        let outcome = walk(dir.path(), None, &WalkLimits::default());
        assert_eq!(outcome.count, 1);
    }

    #[test]
    fn hidden_sentinel_matches_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        fs::write(dir.path().join("plain.txt"), "x").unwrap();
        let outcome = walk(dir.path(), Some(&ext_set(&[HIDDEN_SENTINEL])), &WalkLimits::default());
        assert_eq!(outcome.count, 1);
    }

    #[test]
    fn max_files_cap_reports_max_reached() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let limits = WalkLimits {
            max_files: 2,
            max_time: Duration::from_secs(5),
        };
        let outcome = walk(dir.path(), None, &limits);
        assert_eq!(outcome.status, WalkStatus::MaxReached);
        assert_eq!(outcome.count, 2);
    }

    #[test]
    fn samples_are_bounded_at_five() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let outcome = walk(dir.path(), None, &WalkLimits::default());
        assert_eq!(outcome.count, 20);
        assert!(outcome.samples.len() <= MAX_SAMPLES);
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_symlinked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "nope").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let outcome = walk(dir.path(), None, &WalkLimits::default());
        assert_eq!(outcome.count, 0);
    }
}
