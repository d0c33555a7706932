use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// Governed Walker limits (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub max_files: u64,
    pub max_time_ms: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_files: 50_000,
            max_time_ms: 3_000,
        }
    }
}

/// Ensemble Adjudicator cardinality and timeout (spec §4.3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub agent_count: usize,
    pub per_call_timeout_ms: u64,
    pub idleness_threshold: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            agent_count: 3,
            per_call_timeout_ms: 30_000,
            idleness_threshold: 0.70,
        }
    }
}

/// Hash-Chained Audit Ledger retention (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_entries: usize,
    pub max_backups: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_backups: 10,
        }
    }
}

/// Workspace Lock staleness policy (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub stale_check: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { stale_check: true }
    }
}

/// Atomic Tool Executor defaults (spec §4.4.4, §4.4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub run_timeout_s: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { run_timeout_s: 60 }
    }
}

/// Root configuration, TOML-backed per workspace. Mirrors
/// `codingbuddy-core::AppConfig`'s `config_path`/`load`/`ensure`/`save`
/// shape, trimmed to the sections xi actually governs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub walker: WalkerConfig,
    pub ensemble: EnsembleConfig,
    pub ledger: LedgerConfig,
    pub lock: LockConfig,
    pub executor: ExecutorConfig,
}

impl AppConfig {
    pub fn config_path(workspace: &Path) -> PathBuf {
        paths::runtime_dir(workspace).join("config.toml")
    }

    /// Load config from `<workspace>/.xi/config.toml`, defaulting if absent.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = Self::config_path(workspace);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load if present, otherwise write and return the default config.
    pub fn ensure(workspace: &Path) -> anyhow::Result<Self> {
        let path = Self::config_path(workspace);
        if path.exists() {
            return Self::load(workspace);
        }
        let config = Self::default();
        config.save(workspace)?;
        Ok(config)
    }

    pub fn save(&self, workspace: &Path) -> anyhow::Result<()> {
        let path = Self::config_path(workspace);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(&path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_named_values() {
        let config = AppConfig::default();
        assert_eq!(config.walker.max_files, 50_000);
        assert_eq!(config.walker.max_time_ms, 3_000);
        assert_eq!(config.ensemble.agent_count, 3);
        assert_eq!(config.ledger.max_entries, 1000);
        assert_eq!(config.ledger.max_backups, 10);
    }

    #[test]
    fn ensure_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        let first = AppConfig::ensure(workspace).unwrap();
        assert!(AppConfig::config_path(workspace).exists());
        let second = AppConfig::load(workspace).unwrap();
        assert_eq!(first.walker.max_files, second.walker.max_files);
    }

    #[test]
    fn load_on_fresh_workspace_defaults_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config.executor.run_timeout_s, 60);
        assert!(!AppConfig::config_path(dir.path()).exists());
    }
}
