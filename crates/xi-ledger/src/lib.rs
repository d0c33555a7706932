//! Hash-Chained Audit Ledger (spec §4.5): an append-only, tamper-evident
//! log, replaced atomically on each append with rotated backups and
//! restore-from-backup on corruption. The atomic-replace-with-backup
//! sequence is grounded in `deepseek-diff::PatchStore`'s staging pattern;
//! the SHA-256 chaining itself has no teacher analogue and is authored
//! directly from spec §4.5's algorithm.

use std::io::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use xi_core::{sha256_hex, LedgerEntry};

pub const GENESIS: &str = "GENESIS";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: usize,
    pub first_broken: Option<usize>,
    pub unchained: usize,
}

pub struct Ledger {
    path: PathBuf,
    backups_dir: PathBuf,
    max_entries: usize,
    max_backups: usize,
}

impl Ledger {
    pub fn new(max_entries: usize, max_backups: usize) -> Self {
        Self {
            path: xi_core::paths::ledger_path(),
            backups_dir: xi_core::paths::ledger_backups_dir(),
            max_entries,
            max_backups,
        }
    }

    /// Rooted at an arbitrary path; used by tests so runs don't collide on
    /// the real sovereign-state directory.
    pub fn at(path: PathBuf, backups_dir: PathBuf, max_entries: usize, max_backups: usize) -> Self {
        Self {
            path,
            backups_dir,
            max_entries,
            max_backups,
        }
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.load_raw()
    }

    /// Append a new entry, chaining it onto the current tip (spec §4.5
    /// steps 1-8).
    pub fn append(
        &self,
        user: &str,
        action: &str,
        target: &str,
        project: &str,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self.load_raw();

        let prev = entries
            .last()
            .and_then(|entry| entry.chain_hash.clone())
            .unwrap_or_else(|| GENESIS.to_string());

        let mut candidate = LedgerEntry {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now(),
            user: user.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            project: project.to_string(),
            metadata,
            chain_hash: None,
        };
        candidate.chain_hash = Some(chain_hash(&prev, &candidate)?);

        entries.push(candidate);

        if entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(0..overflow);
            rehash_from_genesis(&mut entries)?;
        }

        self.persist(&entries)?;

        Ok(entries.last().expect("just pushed").clone())
    }

    /// Verify the chain end to end, recomputing each entry's expected
    /// `chain_hash` from its predecessor.
    pub fn verify_chain(&self) -> ChainVerification {
        let entries = self.load_raw();
        let mut prev = GENESIS.to_string();
        let mut first_broken = None;
        let mut unchained = 0;

        for (index, entry) in entries.iter().enumerate() {
            match &entry.chain_hash {
                None => unchained += 1,
                Some(recorded) => match chain_hash(&prev, entry) {
                    Ok(expected) if &expected == recorded => prev = recorded.clone(),
                    _ => {
                        first_broken.get_or_insert(index);
                    }
                },
            }
        }

        ChainVerification {
            valid: first_broken.is_none(),
            entries_checked: entries.len(),
            first_broken,
            unchained,
        }
    }

    fn load_raw(&self) -> Vec<LedgerEntry> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<Vec<LedgerEntry>>(&raw) {
                Ok(entries) => entries,
                Err(_) => self.restore_from_backup().unwrap_or_default(),
            },
            Err(_) => Vec::new(),
        }
    }

    /// Restore-from-backup on corruption (spec §4.5 failure mode):
    /// newest-first scan of `ledger_backups/` for the first backup that
    /// parses as a JSON array.
    fn restore_from_backup(&self) -> Option<Vec<LedgerEntry>> {
        let mut backups: Vec<_> = std::fs::read_dir(&self.backups_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        backups.sort();
        backups.reverse();

        for backup in backups {
            if let Ok(raw) = std::fs::read_to_string(&backup) {
                if let Ok(entries) = serde_json::from_str::<Vec<LedgerEntry>>(&raw) {
                    return Some(entries);
                }
            }
        }
        None
    }

    fn persist(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.backups_dir)?;

        if self.path.exists() {
            let epoch = chrono::Utc::now().timestamp_millis();
            let backup_path = self.backups_dir.join(format!("ledger_{epoch}.json.bak"));
            let _ = std::fs::copy(&self.path, backup_path);
            self.rotate_backups()?;
        }

        let rendered = serde_json::to_string(entries)?;
        // Validate before touching the live file: a render that doesn't
        // round-trip aborts here rather than corrupting the live ledger.
        serde_json::from_str::<serde_json::Value>(&rendered)?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp_file = std::fs::File::create(&tmp_path)?;
            tmp_file.write_all(rendered.as_bytes())?;
            tmp_file.flush()?;
            let _ = tmp_file.sync_all();
        }
        std::fs::rename(&tmp_path, &self.path)?;

        let reread = std::fs::read_to_string(&self.path)?;
        serde_json::from_str::<Vec<LedgerEntry>>(&reread)?;

        Ok(())
    }

    fn rotate_backups(&self) -> Result<(), LedgerError> {
        let mut backups: Vec<_> = std::fs::read_dir(&self.backups_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        backups.sort();
        while backups.len() > self.max_backups {
            let oldest = backups.remove(0);
            let _ = std::fs::remove_file(oldest);
        }
        Ok(())
    }
}

fn rehash_from_genesis(entries: &mut [LedgerEntry]) -> Result<(), LedgerError> {
    let mut prev = GENESIS.to_string();
    for entry in entries.iter_mut() {
        entry.chain_hash = None;
        let hash = chain_hash(&prev, entry)?;
        entry.chain_hash = Some(hash.clone());
        prev = hash;
    }
    Ok(())
}

fn chain_hash(prev: &str, entry: &LedgerEntry) -> Result<String, LedgerError> {
    let mut sans_hash = entry.clone();
    sans_hash.chain_hash = None;
    let canonical = canonical_json(&sans_hash)?;
    Ok(sha256_hex(format!("{prev}:{canonical}").as_bytes()))
}

/// Sorted-key, whitespace-free JSON. `serde_json::Value`'s default map is
/// `BTreeMap`-backed (no `preserve_order` feature enabled), so round
/// tripping through `Value` yields sorted keys for free.
fn canonical_json<T: Serialize>(value: &T) -> Result<String, LedgerError> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&as_value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger(dir: &std::path::Path) -> Ledger {
        Ledger::at(
            dir.join("ledger.json"),
            dir.join("ledger_backups"),
            1000,
            10,
        )
    }

    #[test]
    fn first_entry_chains_onto_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = test_ledger(dir.path());
        let entry = ledger
            .append("alice", "write", "a.txt", "proj", serde_json::json!({}))
            .unwrap();
        let expected = chain_hash(GENESIS, &{
            let mut e = entry.clone();
            e.chain_hash = None;
            e
        })
        .unwrap();
        assert_eq!(entry.chain_hash, Some(expected));
    }

    #[test]
    fn verify_chain_passes_on_freshly_appended_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = test_ledger(dir.path());
        for i in 0..5 {
            ledger
                .append("alice", "write", &format!("f{i}.txt"), "proj", serde_json::json!({}))
                .unwrap();
        }
        let verification = ledger.verify_chain();
        assert!(verification.valid);
        assert_eq!(verification.entries_checked, 5);
        assert_eq!(verification.unchained, 0);
    }

    #[test]
    fn tampering_with_an_entry_breaks_verification() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = test_ledger(dir.path());
        ledger
            .append("alice", "write", "a.txt", "proj", serde_json::json!({}))
            .unwrap();
        ledger
            .append("alice", "write", "b.txt", "proj", serde_json::json!({}))
            .unwrap();

        let mut entries = ledger.entries();
        entries[0].action = "tampered".to_string();
        let rendered = serde_json::to_string(&entries).unwrap();
        std::fs::write(dir.path().join("ledger.json"), rendered).unwrap();

        let verification = ledger.verify_chain();
        assert!(!verification.valid);
        assert_eq!(verification.first_broken, Some(0));
    }

    #[test]
    fn truncation_resets_chain_to_genesis_at_oldest_retained_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::at(dir.join("ledger.json"), dir.join("ledger_backups"), 3, 10);
        for i in 0..6 {
            ledger
                .append("alice", "write", &format!("f{i}.txt"), "proj", serde_json::json!({}))
                .unwrap();
        }
        let entries = ledger.entries();
        assert_eq!(entries.len(), 3);
        let verification = ledger.verify_chain();
        assert!(verification.valid);
    }

    #[test]
    fn legacy_entries_without_chain_hash_are_tolerated_but_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = test_ledger(dir.path());
        let legacy = LedgerEntry {
            id: "legacy-1".to_string(),
            timestamp: chrono::Utc::now(),
            user: "bob".to_string(),
            action: "write".to_string(),
            target: "x.txt".to_string(),
            project: "proj".to_string(),
            metadata: serde_json::json!({}),
            chain_hash: None,
        };
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("ledger.json"), serde_json::to_string(&vec![legacy]).unwrap()).unwrap();

        let verification = ledger.verify_chain();
        assert_eq!(verification.unchained, 1);
        assert!(verification.valid);
    }

    #[test]
    fn corrupted_live_file_restores_from_newest_valid_backup() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = test_ledger(dir.path());
        ledger
            .append("alice", "write", "a.txt", "proj", serde_json::json!({}))
            .unwrap();
        ledger
            .append("alice", "write", "b.txt", "proj", serde_json::json!({}))
            .unwrap();

        std::fs::write(dir.path().join("ledger.json"), "{not valid json array").unwrap();

        let entries = ledger.entries();
        assert_eq!(entries.len(), 1, "restores the newest backup taken before the second append");
    }
}
