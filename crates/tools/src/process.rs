//! External process execution shared by the scanner wrappers.

use regex::Regex;
use scanpilot_core::CapabilityError;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])|\[[0-9;]*m").unwrap()
});

/// Captured output of a process that exited successfully.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// How to launch one external program.
#[derive(Debug, Clone)]
pub struct ProgramRun<'a> {
    program: &'a str,
    args: Vec<String>,
    cwd: Option<&'a Path>,
    timeout: Option<Duration>,
}

impl<'a> ProgramRun<'a> {
    pub fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &'a Path) -> Self {
        self.cwd = Some(dir);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run to completion. A non-zero exit is a [`CapabilityError::ProcessFailed`].
    pub async fn run(self) -> Result<ProcessOutput, CapabilityError> {
        debug!(program = %self.program, args = ?self.args, "Executing external program");

        let mut command = Command::new(self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.cwd {
            command.current_dir(dir);
        }

        let spawn_error = |e: std::io::Error| CapabilityError::Spawn {
            program: self.program.to_string(),
            reason: e.to_string(),
        };

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result.map_err(spawn_error)?,
                Err(_) => {
                    // Dropping the output future kills the child.
                    warn!(program = %self.program, timeout_secs = limit.as_secs(), "Program timed out");
                    return Err(CapabilityError::Timeout {
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
            None => command.output().await.map_err(spawn_error)?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(program = %self.program, exit_code = code, "Program failed");
            return Err(CapabilityError::ProcessFailed {
                program: self.program.to_string(),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

/// Remove terminal color and control sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}
