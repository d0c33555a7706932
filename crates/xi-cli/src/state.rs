//! Assembles the deterministic `StateBlob` injected into model prompts
//! (spec §3). Recomputed on every call; never cached.

use std::path::Path;

use xi_core::{sha256_hex, StateBlob};
use xi_walker::{walk, WalkLimits};

const DEFAULT_MODEL: &str = "xibalba:latest";
const MAX_FILE_LIST: usize = 200;

pub fn build(workspace: &Path) -> StateBlob {
    let cwd = workspace.to_string_lossy().to_string();
    let project = workspace
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| cwd.clone());

    let outcome = walk(workspace, None, &WalkLimits::default());
    let file_list: Vec<String> = outcome
        .samples
        .iter()
        .take(MAX_FILE_LIST)
        .map(|path| path.to_string_lossy().to_string())
        .collect();

    let framework_root = std::env::var("XI_FRAMEWORK_ROOT").unwrap_or_else(|_| cwd.clone());
    let interpreter_path = std::env::current_exe()
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|_| "xi".to_string());

    let mut blob = StateBlob {
        cwd,
        project,
        version: env!("CARGO_PKG_VERSION").to_string(),
        file_count: outcome.count,
        file_list,
        model: DEFAULT_MODEL.to_string(),
        framework_root,
        interpreter_path,
        sha256: String::new(),
    };

    let fingerprint = format!(
        "{}:{}:{}:{}:{}",
        blob.cwd, blob.project, blob.version, blob.file_count, blob.model
    );
    blob.sha256 = sha256_hex(fingerprint.as_bytes());
    blob
}
