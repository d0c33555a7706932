use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::paths;

/// Append-only diagnostic logger. Mirrors `deepseek-observe`'s `Observer`
/// minus its `reqwest`-backed telemetry sink: xi has no remote collector,
/// so every event either lands in the diagnostic log, the payload trace
/// log, or — when verbose — stderr.
pub struct Observer {
    diagnostic_log: PathBuf,
    payload_trace_log: PathBuf,
    verbose: AtomicBool,
}

impl Observer {
    /// Construct an Observer rooted at the sovereign-state directory,
    /// creating it if absent.
    pub fn new() -> anyhow::Result<Self> {
        let dir = paths::sovereign_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            diagnostic_log: paths::cli_diagnostic_log(),
            payload_trace_log: paths::payload_trace_log(),
            verbose: AtomicBool::new(false),
        })
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Always-on structured line, regardless of verbosity.
    pub fn record_event(&self, event: &str, detail: &str) {
        let line = format!("{} {} {}", Utc::now().to_rfc3339(), event, detail);
        let _ = append_line(&self.diagnostic_log, &line);
    }

    /// One line per Atomic Tool Executor call, per SPEC_FULL.md §10 item 1.
    /// Gated behind `--verbose`; never part of the receipt contract.
    pub fn trace_tool_call(&self, op: &str, path: &str, exit_code: i32) {
        if !self.is_verbose() {
            return;
        }
        let line = format!("op={op} path={path} exit_code={exit_code}");
        eprintln!("[xi] {line}");
        let _ = append_line(&self.diagnostic_log, &format!("{} TRACE {}", Utc::now().to_rfc3339(), line));
    }

    /// Warnings always mirror to stderr, independent of verbosity.
    pub fn warn(&self, message: &str) {
        eprintln!("[xi WARN] {message}");
        let _ = append_line(&self.diagnostic_log, &format!("{} WARN {}", Utc::now().to_rfc3339(), message));
    }

    /// Appends a raw payload (e.g. a model prompt or response body) to the
    /// payload trace log, bypassing the structured event format. Intended
    /// for offline debugging, never read back by xi itself.
    pub fn trace_payload(&self, label: &str, payload: &str) {
        let line = format!("{} {} {}", Utc::now().to_rfc3339(), label, payload);
        let _ = append_line(&self.payload_trace_log, &line);
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
