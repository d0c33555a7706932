//! CLI entry point (spec §6): parses the operator-facing argument surface,
//! assembles a `Session` wired to every Deterministic Action Core crate, and
//! dispatches either a subcommand or a single-shot `-c` directive.

mod cli;
mod commands;
mod output;
mod state;

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::Session;
use xi_core::{AppConfig, ExitCode, Mode, Observer};
use xi_executor::WorkspaceLock;
use xi_ledger::Ledger;
use xi_policy::PolicyEngine;

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        generate(*shell, &mut command, name, &mut std::io::stdout());
        return ExitCode::Ok.code();
    }

    let workspace = match resolve_workspace(&cli.workspace) {
        Ok(workspace) => workspace,
        Err(err) => {
            eprintln!("[xi] unusable workspace {}: {err}", cli.workspace.display());
            return ExitCode::RouteError.code();
        }
    };

    let config = match AppConfig::ensure(&workspace) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[xi] failed to load config: {err}");
            return ExitCode::RouteError.code();
        }
    };

    let observer = match Observer::new() {
        Ok(observer) => observer,
        Err(err) => {
            eprintln!("[xi] failed to initialize observer: {err}");
            return ExitCode::RouteError.code();
        }
    };
    observer.set_verbose(cli.verbose);
    observer.record_event("invoke", &format!("mode={:?} workspace={}", cli.mode, workspace.display()));

    let policy = PolicyEngine::new(workspace.clone());
    let ledger = Ledger::new(config.ledger.max_entries, config.ledger.max_backups);
    let mode: Mode = cli.mode.into();

    // `lock status`/`lock release` must work even while another session
    // holds the lock, so they're the only commands that skip acquisition.
    let holds_lock = !matches!(cli.command, Some(Commands::Lock { .. }));
    let _lock = if holds_lock {
        match WorkspaceLock::acquire(&workspace) {
            Ok(lock) => Some(lock),
            Err(err) => {
                eprintln!("[xi] {err}");
                return ExitCode::PolicyViolation.code();
            }
        }
    } else {
        None
    };

    let session = Session {
        workspace,
        mode,
        config,
        policy,
        ledger,
        observer,
        format: cli.format,
        json: cli.json,
    };

    match (&cli.command, &cli.directive) {
        (Some(command), _) => dispatch_command(&session, command),
        (None, Some(directive)) => session.directive(directive),
        (None, None) => {
            eprintln!("[xi] no subcommand or -c/--command directive given; see --help");
            ExitCode::RouteError.code()
        }
    }
}

fn dispatch_command(session: &Session, command: &Commands) -> i32 {
    match command {
        Commands::Validate => session.validate(),
        Commands::Status => session.status(),
        Commands::Verify { json } => session.verify(*json),
        Commands::Gates => session.gates(),
        Commands::Whereami => session.whereami(),
        Commands::Read { path } => session.read(path),
        Commands::Write { path, content } => session.write(path, content),
        Commands::Delete { path } => session.delete(path),
        Commands::Run { cmd } => session.run_shell(&cmd.join(" ")),
        Commands::Lane { id, prompt } => session.lane(id, prompt),
        Commands::Swarm { action } => session.swarm(action),
        Commands::Lock { action } => session.lock(action),
        // Intercepted in `run` before a Session is ever built.
        Commands::Completions { .. } => ExitCode::Ok.code(),
    }
}

fn resolve_workspace(raw: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(raw)?;
    raw.canonicalize()
}
