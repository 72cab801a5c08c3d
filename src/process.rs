//! External program execution.
//!
//! Every external tool kbundle drives (only `readelf` today) goes through
//! [`Cmd`], so failures carry the program name, exit code and stderr.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::trace;

/// Captured result of a finished program.
#[derive(Debug, Clone)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Builder for a single program invocation.
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    allow_fail: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            allow_fail: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_owned());
        self
    }

    /// Return the output even when the program exits non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Replace the default "'program' failed" error prefix.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_prefix = Some(msg.into());
        self
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn run(self) -> Result<Output> {
        let program = self.program.to_string_lossy().into_owned();
        trace!(program, args = ?self.args, "Running");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("Failed to execute '{program}'. Is it installed?"))?;

        let result = Output {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{program}' failed"));
            let stderr = result.stderr.trim();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            }
            bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
        }

        Ok(result)
    }
}
