//! Command execution
//!
//! This module handles spawning external programs for command steps.

use crate::error::{RuntimeError, RuntimeResult};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; a child killed by a signal reports 1
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `program` with `args` in `working_dir` and capture its output
pub fn capture_command(
    program: &str,
    args: &[String],
    working_dir: &Path,
) -> RuntimeResult<CommandOutput> {
    let mut command = StdCommand::new(program);
    command.args(args);
    command.current_dir(working_dir);

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let output = command.output().map_err(|e| RuntimeError::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    Ok(CommandOutput {
        code: output.status.code().unwrap_or(1),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Run a command step and relay its output
///
/// On success the child's stdout is copied to ours; otherwise its stderr is
/// printed. Returns the child's exit code.
pub fn execute_command(program: &str, args: &[String], working_dir: &Path) -> RuntimeResult<i32> {
    tracing::debug!("[RUN] {} {}", program, args.join(" "));

    let output = capture_command(program, args, working_dir)?;
    if output.success() {
        let mut stdout = io::stdout().lock();
        // ignore a closed stdout
        let _ = stdout.write_all(&output.stdout);
        let _ = stdout.flush();
    } else {
        eprintln!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
    }
    Ok(output.code)
}
