//! External tool invocation
//!
//! Build, flash and capture stages all shell out to host tools (cmake,
//! make, openocd, picotool, sigrok-cli). They go through [`CommandRunner`]
//! so the stages can be exercised against a recording fake.

use crate::error::{HilError, Result};
use std::io::ErrorKind;
use std::process::Command;

/// Captured result of one external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub program: String,
    /// Exit code, `None` when the child was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stderr followed by stdout, for error details
    pub fn combined(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} exited with {}",
            self.program,
            self.code
                .map(|c| format!("status {}", c))
                .unwrap_or_else(|| "a signal".to_string())
        ));
        for stream in [&self.stderr, &self.stdout] {
            let trimmed = stream.trim_end();
            if !trimmed.is_empty() {
                out.push('\n');
                out.push_str(trimmed);
            }
        }
        out
    }
}

/// Runs an external program to completion and captures its output
pub trait CommandRunner {
    /// Run `program` with `args`, blocking until it exits.
    ///
    /// A missing binary is reported as [`HilError::ToolNotFound`]; a
    /// non-zero exit is *not* an error here, callers decide what it means.
    fn run(&mut self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<CommandOutput> {
        log::debug!("$ {} {}", program, args.join(" "));

        // output() waits for the child, so it is always reaped
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => HilError::ToolNotFound {
                    tool: program.to_string(),
                },
                _ => HilError::io(program, e),
            })?;

        let result = CommandOutput {
            program: program.to_string(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            log::debug!("{} failed: {:?}", program, result.code);
        }
        Ok(result)
    }
}

/// Build an owned argument vector from string slices
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
