//! Read/write/patch/delete with cryptographic receipts (spec §4.4.3,
//! §4.4.4). The atomic-write sequence (temp file in the target's
//! directory, fsync-tolerant flush, sibling backup, atomic rename,
//! re-read-and-verify) is grounded in `deepseek-diff::PatchStore`'s staging
//! pattern, simplified: xi's patch step is a deterministic literal
//! find/replace rather than a unified diff applied via `git apply`.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use xi_core::{sha256_hex, ActionReceipt, ToolOp};
use xi_policy::PolicyEngine;

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error("{0}")]
    Policy(#[from] xi_policy::PolicyError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("hash mismatch after write")]
    HashMismatch,
    #[error("stale plan: needle not found")]
    StalePlan,
}

impl StepError {
    fn exit_code(&self) -> i32 {
        match self {
            StepError::Policy(err) => err.exit_code(),
            StepError::Io(_) => 11,
            StepError::HashMismatch => 12,
            StepError::StalePlan => 14,
        }
    }

    fn reason(&self) -> String {
        match self {
            StepError::Policy(err) => err.reason_code().to_string(),
            StepError::Io(err) => format!("IO_ERROR: {err}"),
            StepError::HashMismatch => "HARDWARE_VERIFICATION_FAILED".to_string(),
            StepError::StalePlan => "STALE_PLAN".to_string(),
        }
    }
}

pub struct ReadOutcome {
    pub receipt: ActionReceipt,
    pub content: Option<Vec<u8>>,
}

pub fn read(engine: &PolicyEngine, raw_path: &str) -> ReadOutcome {
    let target = match engine.check_boundary(raw_path) {
        Ok(target) => target,
        Err(err) => {
            return ReadOutcome {
                receipt: refusal_receipt(ToolOp::Read, raw_path, &StepError::Policy(err)),
                content: None,
            }
        }
    };

    match std::fs::read(&target) {
        Ok(bytes) => {
            let sha256 = sha256_hex(&bytes);
            let receipt = success_receipt(ToolOp::Read, &target, bytes.len() as u64, sha256);
            ReadOutcome {
                receipt,
                content: Some(bytes),
            }
        }
        Err(err) => ReadOutcome {
            receipt: refusal_receipt(ToolOp::Read, raw_path, &StepError::Io(err)),
            content: None,
        },
    }
}

pub fn write(engine: &PolicyEngine, raw_path: &str, content: &[u8]) -> ActionReceipt {
    let target = match engine.check_boundary(raw_path) {
        Ok(target) => target,
        Err(err) => return refusal_receipt(ToolOp::Write, raw_path, &StepError::Policy(err)),
    };
    if let Err(err) = engine.check_quarantine(&target) {
        return refusal_receipt(ToolOp::Write, raw_path, &StepError::Policy(err));
    }

    match atomic_write(&target, content) {
        Ok((sha256, bytes)) => success_receipt(ToolOp::Write, &target, bytes, sha256),
        Err(err) => refusal_receipt(ToolOp::Write, raw_path, &err),
    }
}

/// Patch is write preceded by a deterministic literal find/replace; a
/// missing needle is the system's optimistic-concurrency signal.
pub fn patch(engine: &PolicyEngine, raw_path: &str, needle: &str, replacement: &str) -> ActionReceipt {
    let target = match engine.check_boundary(raw_path) {
        Ok(target) => target,
        Err(err) => return refusal_receipt(ToolOp::Patch, raw_path, &StepError::Policy(err)),
    };
    if let Err(err) = engine.check_quarantine(&target) {
        return refusal_receipt(ToolOp::Patch, raw_path, &StepError::Policy(err));
    }

    let current = match std::fs::read_to_string(&target) {
        Ok(current) => current,
        Err(err) => return refusal_receipt(ToolOp::Patch, raw_path, &StepError::Io(err)),
    };
    if !current.contains(needle) {
        return refusal_receipt(ToolOp::Patch, raw_path, &StepError::StalePlan);
    }

    let patched = current.replacen(needle, replacement, 1);
    match atomic_write(&target, patched.as_bytes()) {
        Ok((sha256, bytes)) => success_receipt(ToolOp::Patch, &target, bytes, sha256),
        Err(err) => refusal_receipt(ToolOp::Patch, raw_path, &err),
    }
}

pub fn delete(engine: &PolicyEngine, raw_path: &str) -> ActionReceipt {
    let target = match engine.check_boundary(raw_path) {
        Ok(target) => target,
        Err(err) => return refusal_receipt(ToolOp::Delete, raw_path, &StepError::Policy(err)),
    };
    if let Err(err) = engine.check_quarantine(&target) {
        return refusal_receipt(ToolOp::Delete, raw_path, &StepError::Policy(err));
    }

    backup_sibling(&target);

    if let Err(err) = std::fs::remove_file(&target) {
        if target.exists() {
            return refusal_receipt(ToolOp::Delete, raw_path, &StepError::Io(err));
        }
    }

    if target.exists() {
        let err = std::io::Error::other("delete did not remove target");
        return refusal_receipt(ToolOp::Delete, raw_path, &StepError::Io(err));
    }

    ActionReceipt::ok(ToolOp::Delete, target.to_string_lossy().to_string())
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn atomic_write(target: &Path, content: &[u8]) -> Result<(String, u64), StepError> {
    let parent = parent_dir(target);
    std::fs::create_dir_all(parent)?;

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("xi-target")
        .to_string();
    let tmp_path = temp_path(parent, &file_name);

    {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(content)?;
        tmp_file.flush()?;
        // Silently tolerate platforms/filesystems where fsync is
        // unavailable or a no-op (spec §4.4.3 step 3).
        let _ = tmp_file.sync_all();
    }

    if target.exists() {
        backup_sibling(target);
    }

    if std::fs::rename(&tmp_path, target).is_err() {
        std::fs::copy(&tmp_path, target)?;
        let _ = std::fs::remove_file(&tmp_path);
    }

    let written = std::fs::read(target)?;
    let actual_hash = sha256_hex(&written);
    let expected_hash = sha256_hex(content);
    if actual_hash != expected_hash {
        return Err(StepError::HashMismatch);
    }

    Ok((actual_hash, written.len() as u64))
}

fn backup_sibling(target: &Path) {
    let parent = parent_dir(target);
    if let Some(name) = target.file_name().and_then(|name| name.to_str()) {
        let backup_path = parent.join(format!("{name}.bak"));
        let _ = std::fs::copy(target, backup_path);
    }
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn temp_path(parent: &Path, original_name: &str) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(".{original_name}.xi-tmp-{}-{n}", std::process::id()))
}

fn success_receipt(op: ToolOp, target: &Path, bytes: u64, sha256: String) -> ActionReceipt {
    let mut receipt = ActionReceipt::ok(op, target.to_string_lossy().to_string());
    receipt.bytes = bytes;
    receipt.sha256 = Some(sha256);
    receipt.mtime = std::fs::metadata(target)
        .ok()
        .and_then(|meta| meta.modified().ok())
        .map(DateTime::<Utc>::from);
    receipt
}

fn refusal_receipt(op: ToolOp, raw_path: &str, err: &StepError) -> ActionReceipt {
    ActionReceipt::refused(op, raw_path, err.exit_code(), err.reason())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_and_hashes_match() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(dir.path().to_path_buf());
        let write_receipt = write(&engine, "notes.txt", b"hello world");
        assert!(write_receipt.ok);
        let read_outcome = read(&engine, "notes.txt");
        assert!(read_outcome.receipt.ok);
        assert_eq!(read_outcome.content.unwrap(), b"hello world");
        assert_eq!(write_receipt.sha256, read_outcome.receipt.sha256);
    }

    #[test]
    fn patch_replaces_needle_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(dir.path().to_path_buf());
        write(&engine, "a.txt", b"hello world");
        let receipt = patch(&engine, "a.txt", "world", "there");
        assert!(receipt.ok);
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "hello there");
    }

    #[test]
    fn patch_with_missing_needle_fails_stale_plan_and_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(dir.path().to_path_buf());
        write(&engine, "a.txt", b"hello");
        let receipt = patch(&engine, "a.txt", "goodbye", "hi");
        assert!(!receipt.ok);
        assert_eq!(receipt.exit_code, 14);
        assert_eq!(receipt.reason.as_deref(), Some("STALE_PLAN"));
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn delete_removes_file_and_leaves_backup() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(dir.path().to_path_buf());
        write(&engine, "a.txt", b"gone soon");
        let receipt = delete(&engine, "a.txt");
        assert!(receipt.ok);
        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join("a.txt.bak").exists());
    }

    #[test]
    fn write_outside_workspace_is_refused_with_policy_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(dir.path().to_path_buf());
        let receipt = write(&engine, "../escape.txt", b"x");
        assert!(!receipt.ok);
        assert_eq!(receipt.exit_code, 13);
    }
}
