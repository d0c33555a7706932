//! Boundary Policy A, quarantine, runaway guard, and the Mode Governor
//! (spec §4.4.1, §4.4.2, §4.4.6, §4.6).
//!
//! Grounded in `deepseek_policy::PolicyEngine`: a single `thiserror` enum
//! per refusal class, component-by-component path inspection, and
//! allow/deny precedence resolved before any filesystem effect. The
//! containment algorithm itself differs from the teacher's (canonicalize
//! + `starts_with`, rather than a `ParentDir`-component reject), because
//! the spec requires symlink rejection at every path depth rather than a
//! simple absolute-path/`..` ban.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use xi_core::{Mode, ToolOp};

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("boundary rejection: path escapes the workspace or crosses a symlink")]
    BoundaryRejection,
    #[error("quarantine rejection: path matches a .xi-ignore pattern")]
    QuarantineRejection,
    #[error("mode {mode} forbids operation {op}")]
    ModeForbidden { mode: String, op: String },
    #[error("runaway guard: refusing unbounded operation without a \"force\" keyword")]
    CapReached,
    #[error("dangerous command rejection: matches a known-destructive pattern")]
    DangerousCommand,
}

impl PolicyError {
    pub fn error_kind(&self) -> xi_core::ErrorKind {
        match self {
            PolicyError::BoundaryRejection
            | PolicyError::QuarantineRejection
            | PolicyError::ModeForbidden { .. }
            | PolicyError::DangerousCommand => xi_core::ErrorKind::PolicyRefusal,
            PolicyError::CapReached => xi_core::ErrorKind::CapReached,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            PolicyError::BoundaryRejection => "POLICY_A_REJECTION",
            PolicyError::QuarantineRejection => "QUARANTINE_REJECTION",
            PolicyError::ModeForbidden { .. } => "MODE_FORBIDDEN",
            PolicyError::CapReached => "CAP_REACHED",
            PolicyError::DangerousCommand => "DANGEROUS_COMMAND_REJECTION",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PolicyError::BoundaryRejection
            | PolicyError::QuarantineRejection
            | PolicyError::ModeForbidden { .. }
            | PolicyError::DangerousCommand => 13,
            PolicyError::CapReached => 16,
        }
    }
}

/// Known-destructive shell patterns rejected outright, independent of the
/// runaway guard's numeric/wildcard heuristics. Grounded in the original
/// source's `PromptGuard.check`: a short denylist of commands with no
/// legitimate use inside a bounded workspace session.
const DANGEROUS_COMMAND_PATTERNS: &[&str] = &["rm -rf /", "format c:", "shutdown -h now"];

pub struct PolicyEngine {
    workspace_root: PathBuf,
    ignore_patterns: Vec<String>,
}

impl PolicyEngine {
    pub fn new(workspace_root: PathBuf) -> Self {
        let ignore_patterns = load_ignore_patterns(&workspace_root);
        Self {
            workspace_root,
            ignore_patterns,
        }
    }

    /// Boundary Policy A (spec §4.4.1). Returns the canonicalized absolute
    /// target on success.
    pub fn check_boundary(&self, raw_path: &str) -> Result<PathBuf, PolicyError> {
        let expanded = xi_core::paths::expand_tilde(raw_path);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace_root.join(expanded)
        };

        let sovereign = xi_core::paths::sovereign_dir();
        if absolute.starts_with(&sovereign) {
            return Ok(absolute);
        }

        let mut prefix = PathBuf::new();
        for component in absolute.components() {
            prefix.push(component);
            if let Ok(meta) = std::fs::symlink_metadata(&prefix) {
                if meta.file_type().is_symlink() {
                    return Err(PolicyError::BoundaryRejection);
                }
            }
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|_| PolicyError::BoundaryRejection)?;
        let canonical_target = canonicalize_best_effort(&absolute)?;

        if canonical_target == canonical_root || canonical_target.starts_with(&canonical_root) {
            Ok(canonical_target)
        } else {
            Err(PolicyError::BoundaryRejection)
        }
    }

    /// Quarantine check against `.xi-ignore` glob patterns (spec §4.4.2).
    pub fn check_quarantine(&self, target: &Path) -> Result<(), PolicyError> {
        let rel = target.strip_prefix(&self.workspace_root).unwrap_or(target);
        let rel_str = rel.to_string_lossy();
        for pattern in &self.ignore_patterns {
            if let Ok(glob) = glob::Pattern::new(pattern) {
                if glob.matches(&rel_str) {
                    return Err(PolicyError::QuarantineRejection);
                }
            }
        }
        Ok(())
    }

    /// Mode Governor (spec §4.6): reject an operation forbidden in `mode`.
    pub fn check_mode(&self, mode: Mode, op: ToolOp) -> Result<(), PolicyError> {
        if forbidden_ops(mode).contains(&op) {
            return Err(PolicyError::ModeForbidden {
                mode: mode.to_string(),
                op: op.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Runaway guard (spec §4.4.6): textual heuristic over the *directive*
    /// that produced this call, not the resolved path.
    pub fn runaway_guard(&self, directive: &str) -> Result<(), PolicyError> {
        if runaway_guard_trips(directive) {
            Err(PolicyError::CapReached)
        } else {
            Ok(())
        }
    }

    /// Dangerous-command denylist, checked ahead of the runaway guard for
    /// `run` directives. Unconditional: unlike the runaway guard, a
    /// `"force"` keyword does not waive this check.
    pub fn check_dangerous_command(&self, cmd: &str) -> Result<(), PolicyError> {
        let lowered = cmd.to_lowercase();
        if DANGEROUS_COMMAND_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
            Err(PolicyError::DangerousCommand)
        } else {
            Ok(())
        }
    }
}

fn forbidden_ops(mode: Mode) -> BTreeSet<ToolOp> {
    match mode {
        Mode::Plan | Mode::Debug => [ToolOp::Write, ToolOp::Patch, ToolOp::Delete].into(),
        Mode::Act => BTreeSet::new(),
        Mode::Chat | Mode::Review => {
            [ToolOp::Write, ToolOp::Patch, ToolOp::Delete, ToolOp::Run].into()
        }
    }
}

const LARGE_NUMBER_THRESHOLD: u64 = 1000;

fn runaway_guard_trips(directive: &str) -> bool {
    let lowered = directive.to_lowercase();
    if lowered.contains("force") {
        return false;
    }

    let has_wildcard = directive.contains('*') || directive.contains('?');

    let number_re = Regex::new(r"\d+").expect("static regex");
    let has_large_number = number_re
        .find_iter(directive)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .any(|n| n >= LARGE_NUMBER_THRESHOLD);

    has_wildcard || has_large_number
}

fn load_ignore_patterns(workspace_root: &Path) -> Vec<String> {
    let path = workspace_root.join(".xi-ignore");
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn canonicalize_best_effort(path: &Path) -> Result<PathBuf, PolicyError> {
    let mut existing = path.to_path_buf();
    let mut missing_tail: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
            break;
        };
        missing_tail.push(name);
        match existing.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => existing = parent.to_path_buf(),
            _ => break,
        }
    }

    let mut canonical = existing
        .canonicalize()
        .map_err(|_| PolicyError::BoundaryRejection)?;
    for part in missing_tail.into_iter().rev() {
        canonical.push(part);
    }
    Ok(canonical)
}
