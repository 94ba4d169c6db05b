//! External process seam
//!
//! Commands are argument vectors, never shell strings. Execution goes
//! through [`CommandRunner`] so callers can capture invocations instead of
//! spawning anything.

use serde::{Deserialize, Serialize};
use std::io;
use std::process::{Command, Stdio};
use tracing::debug;

/// A program plus its argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: vec![] }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// True if any argument equals `arg` exactly.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Captured result of one process run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// The tool's own explanation of a failure: stderr, else stdout.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

pub trait CommandRunner {
    /// Run to completion. `Err` only when the process could not be spawned.
    fn run(&mut self, command: &CommandSpec) -> io::Result<ProcessOutput>;
}

/// Runs commands with `std::process`, one at a time.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &CommandSpec) -> io::Result<ProcessOutput> {
        debug!(program = %command.program, args = ?command.args, "spawning");

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(ProcessOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
