//! Subprocess execution with captured output and optional timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{CiError, Result};

/// A command to execute.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Executable, or a shell prefix when `shell` is set (e.g. `npx nx run app:code-pushup --`).
    pub program: String,

    /// Arguments appended after `program`.
    pub args: Vec<String>,

    /// Working directory.
    pub cwd: PathBuf,

    /// Run through the platform shell.
    pub shell: bool,

    /// Timeout in seconds (`None` = wait indefinitely).
    pub timeout_secs: Option<u64>,
}

impl ProcessConfig {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            shell: false,
            timeout_secs: None,
        }
    }

    /// A shell command line rooted at `prefix`.
    pub fn shell(prefix: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            shell: true,
            ..Self::new(prefix, cwd)
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

    pub fn timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Human-readable command line.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Output of a successful process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Execute a process and capture its output.
///
/// A non-zero exit status is returned as [`CiError::Process`] with the captured
/// stdout and stderr. The child is killed if the returned future is dropped.
pub async fn execute_process(config: &ProcessConfig) -> Result<ProcessOutput> {
    let start = Instant::now();
    let command_line = config.command_line();

    let mut command = if config.shell {
        shell_command(&command_line)
    } else {
        let mut command = Command::new(&config.program);
        command.args(&config.args);
        command
    };

    debug!(command = %command_line, cwd = %config.cwd.display(), "executing process");

    let child = command
        .current_dir(&config.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match config.timeout_secs {
        Some(secs) if secs > 0 => {
            tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
                .await
                .map_err(|_| CiError::Timeout {
                    command: command_line.clone(),
                    secs,
                })??
        }
        _ => child.wait_with_output().await?,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(CiError::Process {
            command: command_line,
            exit_code,
            stdout,
            stderr,
        });
    }

    debug!(command = %command_line, duration_ms, "process finished");

    Ok(ProcessOutput {
        command: command_line,
        exit_code,
        stdout,
        stderr,
        duration_ms,
    })
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

/// Quote an argument for a POSIX shell when it contains special characters.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+{}".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
