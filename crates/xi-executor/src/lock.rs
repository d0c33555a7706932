//! Workspace Lock (spec §4.7): a single-writer advisory lock recoverable
//! from a dead owner via a signal-0 liveness probe. No equivalent exists in
//! the teacher repo, which has no concept of exclusive workspace
//! ownership — authored fresh, in the teacher's general style of wrapping
//! a thin `libc` call behind a small typed API (see `deepseek-observe`'s
//! use of plain `std::fs` primitives rather than a crate for file state).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("workspace busy: held by live process {0}")]
    Busy(u32),
    #[error("failed to acquire workspace lock")]
    AcquireFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// RAII guard for the workspace lock. Releasing the lock (dropping the
/// guard or calling `release`) removes the lockfile.
pub struct WorkspaceLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl WorkspaceLock {
    /// Acquire the lock for `workspace`, reclaiming it if the recorded
    /// owner is no longer alive (spec §4.7 steps 1-4). Falls back to the
    /// sovereign-state directory's lockfile when the workspace root itself
    /// can't hold one (read-only mount, missing directory, ...).
    pub fn acquire(workspace: &Path) -> Result<Self, LockError> {
        let primary = xi_core::paths::lock_path(workspace);
        let (path, mut file) = match OpenOptions::new().read(true).write(true).create(true).open(&primary) {
            Ok(file) => (primary, file),
            Err(_) => {
                let fallback = xi_core::paths::lock_path_fallback();
                if let Some(parent) = fallback.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().read(true).write(true).create(true).open(&fallback)?;
                (fallback, file)
            }
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        if let Ok(pid) = contents.trim().parse::<u32>() {
            if process_is_alive(pid) {
                return Err(LockError::Busy(pid));
            }
        }

        if !try_flock(&file) {
            return Err(LockError::AcquireFailed);
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { path, file })
    }

    pub fn release(self) {
        // Drop performs the actual cleanup; consuming self here documents
        // the release point at the call site.
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read-only status probe for `xi lock status` (SPEC_FULL.md §10 item 3).
/// Returns the recorded PID without taking the lock.
pub fn status(workspace: &Path) -> Option<u32> {
    let primary = xi_core::paths::lock_path(workspace);
    let contents = std::fs::read_to_string(&primary)
        .or_else(|_| std::fs::read_to_string(xi_core::paths::lock_path_fallback()))
        .ok()?;
    contents.trim().parse::<u32>().ok()
}

/// Operator-invoked forced release for `xi lock release --force`.
pub fn force_release(workspace: &Path) -> std::io::Result<()> {
    let primary = xi_core::paths::lock_path(workspace);
    if primary.exists() {
        std::fs::remove_file(primary)?;
    }
    let fallback = xi_core::paths::lock_path_fallback();
    if fallback.exists() {
        std::fs::remove_file(fallback)?;
    }
    Ok(())
}

#[cfg(unix)]
fn try_flock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> bool {
    true
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_drop_removes_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = xi_core::paths::lock_path(dir.path());
        {
            let _lock = WorkspaceLock::acquire(dir.path()).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_while_first_alive_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let _first = WorkspaceLock::acquire(dir.path()).unwrap();
        let second = WorkspaceLock::acquire(dir.path());
        assert!(matches!(second, Err(LockError::Busy(_))));
    }

    #[test]
    fn reclaims_lock_left_by_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = xi_core::paths::lock_path(dir.path());
        // A PID essentially guaranteed not to be alive in any test sandbox.
        std::fs::write(&path, "999999").unwrap();
        let lock = WorkspaceLock::acquire(dir.path());
        assert!(lock.is_ok());
    }

    #[test]
    fn status_reports_pid_without_acquiring() {
        let dir = tempfile::tempdir().unwrap();
        let lock = WorkspaceLock::acquire(dir.path()).unwrap();
        assert_eq!(status(dir.path()), Some(std::process::id()));
        lock.release();
    }
}
