//! Shell execution with a hard wall-clock timeout (spec §4.4.5).

use std::io::Read as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use xi_core::{ActionReceipt, ExitCode, ToolOp};

#[derive(Debug, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

pub fn run(workspace_root: &Path, raw_cmd: &str, timeout: Duration) -> (ActionReceipt, RunOutput) {
    let args = match shell_words::split(raw_cmd) {
        Ok(args) if !args.is_empty() => args,
        _ => {
            let receipt = ActionReceipt::refused(
                ToolOp::Run,
                raw_cmd,
                ExitCode::RouteError.code(),
                "ROUTE_ERROR: empty or unparsable command",
            );
            return (receipt, RunOutput::default());
        }
    };

    let (program, rest) = args.split_first().expect("checked non-empty above");

    let mut child = match Command::new(program)
        .args(rest)
        .current_dir(workspace_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let receipt = ActionReceipt::refused(
                ToolOp::Run,
                raw_cmd,
                ExitCode::RouteError.code(),
                format!("ROUTE_ERROR: failed to spawn: {err}"),
            );
            return (receipt, RunOutput::default());
        }
    };

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stdout_pipe.take() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe.take() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    break child.wait().ok();
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => break None,
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    let output = RunOutput { stdout, stderr };

    if timed_out {
        let receipt = ActionReceipt::refused(ToolOp::Run, raw_cmd, ExitCode::Timeout.code(), "TIMEOUT");
        return (receipt, output);
    }

    let exit_code = status.and_then(|status| status.code()).unwrap_or(-1);
    let mut receipt = ActionReceipt::ok(ToolOp::Run, raw_cmd.to_string());
    receipt.ok = exit_code == 0;
    receipt.exit_code = exit_code;
    (receipt, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_reports_ok_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let (receipt, output) = run(dir.path(), "echo hello", Duration::from_secs(5));
        assert!(receipt.ok);
        assert_eq!(receipt.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_surfaced_not_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (receipt, _output) = run(dir.path(), "sh -c 'exit 7'", Duration::from_secs(5));
        assert!(!receipt.ok);
        assert_eq!(receipt.exit_code, 7);
    }

    #[test]
    fn long_running_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (receipt, _output) = run(dir.path(), "sleep 5", Duration::from_millis(100));
        assert!(!receipt.ok);
        assert_eq!(receipt.exit_code, ExitCode::Timeout.code());
    }

    #[test]
    fn empty_command_is_route_error() {
        let dir = tempfile::tempdir().unwrap();
        let (receipt, _output) = run(dir.path(), "   ", Duration::from_secs(1));
        assert!(!receipt.ok);
        assert_eq!(receipt.exit_code, ExitCode::RouteError.code());
    }
}
