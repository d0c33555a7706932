//! Clap-derive argument surface (spec §6), grounded in
//! `deepseek-cli/src/main.rs`'s `Parser`/`Subcommand` layout: a flat set of
//! `global = true` flags plus a subcommand enum, rather than per-subcommand
//! flag duplication.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(name = "xi", about = "Operator-facing orchestration CLI over the Deterministic Action Core")]
pub struct Cli {
    /// Single-shot directive form: classify and answer without entering a subcommand.
    #[arg(short = 'c', long = "command", value_name = "DIRECTIVE")]
    pub directive: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Chat)]
    pub format: OutputFormat,

    /// Force structured JSON output regardless of `--format`.
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, global = true, value_enum, default_value_t = ModeArg::Plan)]
    pub mode: ModeArg,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Chat,
    Receipts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Plan,
    Act,
    Debug,
    Chat,
    Review,
}

impl From<ModeArg> for xi_core::Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Plan => xi_core::Mode::Plan,
            ModeArg::Act => xi_core::Mode::Act,
            ModeArg::Debug => xi_core::Mode::Debug,
            ModeArg::Chat => xi_core::Mode::Chat,
            ModeArg::Review => xi_core::Mode::Review,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify the workspace and ledger are in a consistent, loadable state.
    Validate,
    /// Print workspace root, active mode, and lock ownership.
    Status,
    /// Verify the audit ledger's hash chain.
    Verify {
        #[arg(long)]
        json: bool,
    },
    /// Print the forbidden-operations set for the active mode.
    Gates,
    /// Print the canonical workspace root (the "where am i" static query).
    Whereami,
    Read {
        path: String,
    },
    Write {
        path: String,
        content: String,
    },
    Delete {
        path: String,
    },
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 1..)]
        cmd: Vec<String>,
    },
    /// Route a prompt to a single named reasoning lane.
    Lane {
        id: String,
        prompt: String,
    },
    Swarm {
        #[command(subcommand)]
        action: SwarmAction,
    },
    /// Workspace Lock diagnostics (SPEC_FULL.md §10 item 3).
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Emit a shell completion script for the given shell.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum SwarmAction {
    Status,
    Process,
    Add { bucket: String, task: String },
}

#[derive(Subcommand, Debug)]
pub enum LockAction {
    Status,
    Release {
        #[arg(long)]
        force: bool,
    },
}
