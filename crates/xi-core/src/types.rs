use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel extension meaning "files whose base name starts with a dot".
pub const HIDDEN_SENTINEL: &str = "__HIDDEN__";

/// Operator session mode. Governs which Atomic Tool Executor operations are
/// permitted (see `xi-policy`'s Mode Governor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Plan,
    Act,
    Debug,
    Chat,
    Review,
}

impl Mode {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "act" => Mode::Act,
            "debug" => Mode::Debug,
            "chat" => Mode::Chat,
            "review" => Mode::Review,
            _ => Mode::Plan,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Plan => "PLAN",
            Mode::Act => "ACT",
            Mode::Debug => "DEBUG",
            Mode::Chat => "CHAT",
            Mode::Review => "REVIEW",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope of a COMPUTED classified query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryScope {
    Local,
    Recursive,
}

/// Output of the Query Classifier — a pure, referentially transparent
/// function from raw operator text to one of these three tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClassifiedQuery {
    Static,
    Computed {
        scope: QueryScope,
        extensions: BTreeSet<String>,
    },
    Reasoning,
}

/// A single atomic assertion extracted from one model agent's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub kind: String,
    pub confidence: f64,
    pub agent: String,
}

/// Claims sharing a canonical normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimGroup {
    pub canonical: String,
    pub agents: BTreeSet<String>,
    pub frequency: usize,
    pub mean_confidence: f64,
}

/// Result of one Ensemble Adjudicator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum AdjudicationResult {
    Adjudicated {
        intersection: Vec<ClaimGroup>,
        minority: Vec<ClaimGroup>,
        confidence: f64,
    },
    Halt {
        reason: String,
        disagreements: Vec<ClaimGroup>,
        raw: Vec<Claim>,
    },
}

/// Tagged variant of the operations the Atomic Tool Executor exposes.
/// Dispatch at the executor boundary is exhaustive over this enum rather
/// than name-matched strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOp {
    Read,
    Write,
    Patch,
    Delete,
    Run,
}

impl ToolOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolOp::Read => "read",
            ToolOp::Write => "write",
            ToolOp::Patch => "patch",
            ToolOp::Delete => "delete",
            ToolOp::Run => "run",
        }
    }

    /// Whether this operation mutates filesystem state.
    pub fn is_mutating(&self) -> bool {
        matches!(self, ToolOp::Write | ToolOp::Patch | ToolOp::Delete)
    }
}

/// A structured record summarizing the outcome of a single tool operation.
/// Distinct from a `LedgerEntry`: a receipt is per-call and caller-facing,
/// the ledger is durable history derived from receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub op: ToolOp,
    pub path: String,
    pub ok: bool,
    pub bytes: u64,
    pub sha256: Option<String>,
    pub mtime: Option<DateTime<Utc>>,
    pub exit_code: i32,
    pub policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionReceipt {
    pub fn ok(op: ToolOp, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            ok: true,
            bytes: 0,
            sha256: None,
            mtime: None,
            exit_code: 0,
            policy: "allowed".to_string(),
            reason: None,
        }
    }

    pub fn refused(op: ToolOp, path: impl Into<String>, exit_code: i32, reason: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            ok: false,
            bytes: 0,
            sha256: None,
            mtime: None,
            exit_code,
            policy: "blocked".to_string(),
            reason: Some(reason.into()),
        }
    }
}

/// Append-only, hash-chained audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub target: String,
    pub project: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_hash: Option<String>,
}

/// A deterministic snapshot injected into model prompts. Recomputed per
/// model call; never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBlob {
    pub cwd: String,
    pub project: String,
    pub version: String,
    pub file_count: u64,
    pub file_list: Vec<String>,
    pub model: String,
    pub framework_root: String,
    pub interpreter_path: String,
    pub sha256: String,
}
