use std::path::PathBuf;
use std::time::Duration;

use xi_adjudicator::{adjudicate, AdjudicationResult};
use xi_core::{ActionReceipt, AppConfig, ExitCode, Mode, Observer, ToolOp};
use xi_ledger::Ledger;
use xi_policy::PolicyEngine;

use crate::cli::{LockAction, OutputFormat, SwarmAction};
use crate::output::{print_json, print_line, render_receipt};
use crate::state;

pub struct Session {
    pub workspace: PathBuf,
    pub mode: Mode,
    pub config: AppConfig,
    pub policy: PolicyEngine,
    pub ledger: Ledger,
    pub observer: Observer,
    pub format: OutputFormat,
    pub json: bool,
}

impl Session {
    /// The output format actually in effect for this call. Spec §4.6: ACT
    /// forces receipt-mode output (structured records, silenced prose)
    /// regardless of the operator's `--format` choice.
    fn effective_format(&self) -> OutputFormat {
        if self.mode == Mode::Act {
            OutputFormat::Receipts
        } else {
            self.format
        }
    }

    /// Gate `op` through the Mode Governor, run it, trace and ledger it.
    /// Returns the process exit code for this operation.
    fn dispatch<F>(&self, op: ToolOp, directive_for_guard: Option<&str>, run: F) -> i32
    where
        F: FnOnce() -> ActionReceipt,
    {
        let format = self.effective_format();

        if let Err(err) = self.policy.check_mode(self.mode, op) {
            let receipt = ActionReceipt::refused(op, "", err.exit_code(), err.reason_code());
            render_receipt(format, self.json, &receipt);
            return receipt.exit_code;
        }

        if let Some(directive) = directive_for_guard {
            if let Err(err) = self.policy.runaway_guard(directive) {
                let receipt = ActionReceipt::refused(op, "", err.exit_code(), err.reason_code());
                render_receipt(format, self.json, &receipt);
                return receipt.exit_code;
            }
        }

        let receipt = run();
        self.observer
            .trace_tool_call(receipt.op.as_str(), &receipt.path, receipt.exit_code);

        if receipt.ok && (op.is_mutating() || op == ToolOp::Run) {
            let metadata = serde_json::to_value(&receipt).unwrap_or(serde_json::Value::Null);
            if let Err(err) = self
                .ledger
                .append("operator", op.as_str(), &receipt.path, &self.project_name(), metadata)
            {
                self.observer.warn(&format!("ledger append failed: {err}"));
            }
        }

        render_receipt(format, self.json, &receipt);
        receipt.exit_code
    }

    fn project_name(&self) -> String {
        self.workspace
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.workspace.to_string_lossy().to_string())
    }

    pub fn read(&self, path: &str) -> i32 {
        let outcome = xi_executor::read(&self.policy, path);
        let receipt = outcome.receipt.clone();
        let format = self.effective_format();
        self.observer.trace_tool_call("read", &receipt.path, receipt.exit_code);
        render_receipt(format, self.json, &receipt);
        if let Some(content) = outcome.content {
            if format == OutputFormat::Chat && !self.json {
                print_line(String::from_utf8_lossy(&content));
            }
        }
        receipt.exit_code
    }

    /// Per spec §4.4.6 the runaway guard tests the originating directive
    /// (the command text), never the payload being written — otherwise
    /// file content containing a large number or a wildcard character
    /// would be refused as if it were itself a directive.
    pub fn write(&self, path: &str, content: &str) -> i32 {
        let path_owned = path.to_string();
        self.dispatch(ToolOp::Write, None, || {
            xi_executor::write(&self.policy, &path_owned, content.as_bytes())
        })
    }

    pub fn delete(&self, path: &str) -> i32 {
        let path_owned = path.to_string();
        self.dispatch(ToolOp::Delete, None, || xi_executor::delete(&self.policy, &path_owned))
    }

    pub fn run_shell(&self, cmd: &str) -> i32 {
        if let Err(err) = self.policy.check_dangerous_command(cmd) {
            let receipt = ActionReceipt::refused(ToolOp::Run, cmd, err.exit_code(), err.reason_code());
            render_receipt(self.effective_format(), self.json, &receipt);
            return receipt.exit_code;
        }

        let workspace = self.workspace.clone();
        let cmd_owned = cmd.to_string();
        let timeout = Duration::from_secs(self.config.executor.run_timeout_s);
        self.dispatch(ToolOp::Run, Some(cmd), || {
            let (receipt, output) = xi_executor::run_command(&workspace, &cmd_owned, timeout);
            if !output.stdout.is_empty() {
                print!("{}", output.stdout);
            }
            if !output.stderr.is_empty() {
                eprint!("{}", output.stderr);
            }
            receipt
        })
    }

    pub fn validate(&self) -> i32 {
        let verification = self.ledger.verify_chain();
        let config_path = AppConfig::config_path(&self.workspace);
        let ok = verification.valid && self.workspace.exists();
        if self.json {
            print_json(&serde_json::json!({
                "ok": ok,
                "workspace": self.workspace.to_string_lossy(),
                "config_path": config_path.to_string_lossy(),
                "ledger_valid": verification.valid,
            }));
        } else {
            print_line(format!("workspace: {}", self.workspace.display()));
            print_line(format!("ledger valid: {}", verification.valid));
        }
        if ok {
            ExitCode::Ok.code()
        } else {
            ExitCode::RouteError.code()
        }
    }

    pub fn status(&self) -> i32 {
        let lock_owner = xi_executor::status(&self.workspace);
        if self.json {
            print_json(&serde_json::json!({
                "workspace": self.workspace.to_string_lossy(),
                "mode": self.mode.as_str(),
                "lock_owner_pid": lock_owner,
            }));
        } else {
            print_line(format!("workspace: {}", self.workspace.display()));
            print_line(format!("mode: {}", self.mode));
            match lock_owner {
                Some(pid) => print_line(format!("lock: held by pid {pid}")),
                None => print_line("lock: free"),
            }
        }
        ExitCode::Ok.code()
    }

    pub fn verify(&self, force_json: bool) -> i32 {
        let verification = self.ledger.verify_chain();
        if force_json || self.json {
            print_json(&serde_json::json!({
                "valid": verification.valid,
                "entries_checked": verification.entries_checked,
                "first_broken": verification.first_broken,
                "unchained": verification.unchained,
            }));
        } else {
            print_line(format!(
                "valid={} checked={} first_broken={:?} unchained={}",
                verification.valid, verification.entries_checked, verification.first_broken, verification.unchained
            ));
        }
        if verification.valid {
            ExitCode::Ok.code()
        } else {
            ExitCode::RouteError.code()
        }
    }

    pub fn gates(&self) -> i32 {
        let ops = [ToolOp::Read, ToolOp::Write, ToolOp::Patch, ToolOp::Delete, ToolOp::Run];
        let forbidden: Vec<&str> = ops
            .iter()
            .filter(|op| self.policy.check_mode(self.mode, **op).is_err())
            .map(|op| op.as_str())
            .collect();
        if self.json {
            print_json(&serde_json::json!({ "mode": self.mode.as_str(), "forbidden": forbidden }));
        } else {
            print_line(format!("mode {}: forbidden = {:?}", self.mode, forbidden));
        }
        ExitCode::Ok.code()
    }

    pub fn whereami(&self) -> i32 {
        let blob = state::build(&self.workspace);
        if self.json {
            print_json(&blob);
        } else {
            print_line(format!("{} (project {})", blob.cwd, blob.project));
        }
        ExitCode::Ok.code()
    }

    /// Answers a STATIC factual query (spec §4.1 step 4) with the specific
    /// fact named by the utterance rather than always reporting cwd/project:
    /// "framework version" and "active model" read from the `StateBlob`,
    /// "what mode"/"current mode" reads the session's own Mode Governor
    /// state, everything else ("where am i", "which workspace", ...) falls
    /// through to the cwd/project report.
    fn static_fact(&self, text: &str) -> i32 {
        let normalized = text
            .trim()
            .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
            .to_lowercase();

        if normalized.contains("framework version") {
            let blob = state::build(&self.workspace);
            return self.print_fact("version", &blob.version);
        }
        if normalized.contains("active model") {
            let blob = state::build(&self.workspace);
            return self.print_fact("model", &blob.model);
        }
        if normalized.contains("what mode") || normalized.contains("current mode") {
            return self.print_fact("mode", self.mode.as_str());
        }

        self.whereami()
    }

    fn print_fact(&self, field: &str, value: &str) -> i32 {
        if self.json {
            print_json(&serde_json::json!({ field: value }));
        } else {
            print_line(format!("{field}: {value}"));
        }
        ExitCode::Ok.code()
    }

    pub fn directive(&self, text: &str) -> i32 {
        match xi_classifier::classify(text) {
            xi_core::ClassifiedQuery::Static => self.static_fact(text),
            xi_core::ClassifiedQuery::Computed { scope, extensions } => {
                let extensions = if extensions.is_empty() { None } else { Some(extensions) };
                let outcome = match scope {
                    xi_core::QueryScope::Recursive => {
                        xi_walker::walk(&self.workspace, extensions.as_ref(), &xi_walker::WalkLimits {
                            max_files: self.config.walker.max_files,
                            max_time: Duration::from_millis(self.config.walker.max_time_ms),
                        })
                    }
                    xi_core::QueryScope::Local => count_local(&self.workspace, extensions.as_ref()),
                };
                if self.json {
                    print_json(&serde_json::json!({
                        "count": outcome.count,
                        "status": format!("{:?}", outcome.status),
                    }));
                } else {
                    print_line(format!("{} files ({:?})", outcome.count, outcome.status));
                }
                ExitCode::Ok.code()
            }
            xi_core::ClassifiedQuery::Reasoning => self.reasoning(text),
        }
    }

    pub fn lane(&self, id: &str, prompt: &str) -> i32 {
        print_line(format!("lane {id}: {}", self.reasoning_summary(prompt)));
        ExitCode::Ok.code()
    }

    pub fn swarm(&self, action: &SwarmAction) -> i32 {
        match action {
            SwarmAction::Status => print_line("swarm: no buckets registered"),
            SwarmAction::Process => print_line("swarm: nothing queued to process"),
            SwarmAction::Add { bucket, task } => print_line(format!("swarm: queued \"{task}\" in bucket {bucket}")),
        }
        ExitCode::Ok.code()
    }

    pub fn lock(&self, action: &LockAction) -> i32 {
        match action {
            LockAction::Status => {
                let owner = xi_executor::status(&self.workspace);
                if self.json {
                    print_json(&serde_json::json!({ "owner_pid": owner }));
                } else {
                    match owner {
                        Some(pid) => print_line(format!("held by pid {pid}")),
                        None => print_line("free"),
                    }
                }
                ExitCode::Ok.code()
            }
            LockAction::Release { force } => {
                if !force {
                    print_line("refusing to release without --force");
                    return ExitCode::PolicyViolation.code();
                }
                match xi_executor::force_release(&self.workspace) {
                    Ok(()) => {
                        print_line("lock released");
                        ExitCode::Ok.code()
                    }
                    Err(err) => {
                        print_line(format!("failed to release lock: {err}"));
                        ExitCode::RouteError.code()
                    }
                }
            }
        }
    }

    fn reasoning(&self, prompt: &str) -> i32 {
        print_line(self.reasoning_summary(prompt));
        ExitCode::Ok.code()
    }

    /// Reasoning-tier queries route through the Ensemble Adjudicator, but
    /// model backends are external collaborators (spec §1 out-of-scope)
    /// xi-cli does not itself vendor. With none registered, report the gap
    /// rather than fabricate a model response.
    fn reasoning_summary(&self, prompt: &str) -> String {
        self.observer.trace_payload("prompt", prompt);
        let backends: Vec<Box<dyn xi_adjudicator::ModelBackend>> = Vec::new();
        let workers = xi_adjudicator::resource_throttle(
            self.config.ensemble.agent_count,
            self.config.ensemble.idleness_threshold,
        );
        let summary = match adjudicate(&backends, prompt, workers) {
            AdjudicationResult::Halt { reason, .. } => format!("halt: {reason}"),
            AdjudicationResult::Adjudicated { confidence, .. } => {
                format!("adjudicated (confidence={confidence:.2})")
            }
        };
        self.observer.trace_payload("response", &summary);
        summary
    }
}

fn count_local(workspace: &std::path::Path, extensions: Option<&std::collections::BTreeSet<String>>) -> xi_walker::WalkOutcome {
    let entries = match std::fs::read_dir(workspace) {
        Ok(entries) => entries,
        Err(_) => {
            return xi_walker::WalkOutcome {
                count: 0,
                samples: Vec::new(),
                status: xi_walker::WalkStatus::OsError,
            }
        }
    };

    let mut count = 0u64;
    let mut samples = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let accepted = match extensions {
            None => true,
            Some(extensions) if extensions.is_empty() => true,
            Some(extensions) => {
                (extensions.contains(xi_core::HIDDEN_SENTINEL) && name.starts_with('.'))
                    || extensions
                        .iter()
                        .filter(|ext| ext.as_str() != xi_core::HIDDEN_SENTINEL)
                        .any(|ext| name.to_lowercase().ends_with(&format!(".{ext}")))
            }
        };
        if accepted {
            count += 1;
            if samples.len() < 5 {
                samples.push(entry.path());
            }
        }
    }

    xi_walker::WalkOutcome {
        count,
        samples,
        status: xi_walker::WalkStatus::Ok,
    }
}
