//! Shell execution engine.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::command::Command;
use super::result::ExecutionResult;
use crate::error::Error;
use crate::Result;

/// Runs one command line in a given directory and reports what happened.
///
/// Implementations must be cancel-safe: dropping the returned future has to
/// stop the underlying process.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<ExecutionResult>;
}

/// Run `command` on `executor`, giving up after `command.timeout`.
///
/// On timeout the in-flight execution future is dropped and
/// [`Error::Timeout`] is returned.
pub async fn execute_with_timeout(
    executor: &dyn ShellExecutor,
    command: &Command,
) -> Result<ExecutionResult> {
    match tokio::time::timeout(command.timeout, executor.execute(command)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}

/// Executor backed by the host shell (`sh -c` on Unix, `cmd /C` on Windows).
///
/// On Unix a `pwd` probe is appended behind a unique marker so that a `cd`
/// inside the command line is reflected in the reported working directory.
#[derive(Debug, Default, Clone)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }

    /// Generate a unique marker for output detection.
    fn marker() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("__CMDLINK_{}_CWD__", timestamp)
    }

    #[cfg(unix)]
    fn build(command: &Command, marker: &str) -> tokio::process::Command {
        let script = format!(
            "{}\n__cmdlink_rc=$?\nprintf '\\n%s\\n' '{}'\npwd\nexit $__cmdlink_rc",
            command.command_line, marker
        );
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[cfg(windows)]
    fn build(command: &Command, _marker: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(&command.command_line);
        cmd
    }
}

/// Split the cwd probe off the end of captured stdout.
///
/// Returns the command's own output and the probed directory. When the
/// marker is missing (the command exited early) stdout is returned whole.
pub fn split_probe(stdout: &str, marker: &str) -> (String, Option<PathBuf>) {
    let needle = format!("\n{}\n", marker);
    match stdout.rfind(&needle) {
        Some(pos) => {
            let cwd = stdout[pos + needle.len()..].trim_end_matches(['\r', '\n']);
            let cwd = (!cwd.is_empty()).then(|| PathBuf::from(cwd));
            (stdout[..pos].to_string(), cwd)
        }
        None => (stdout.to_string(), None),
    }
}

/// Kills the shell's whole process group unless disarmed, so background
/// jobs of a timed-out command die with it.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = i32::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) only delivers a signal; the group leader is our own
    // child started with `process_group(0)`.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
        debug!(pgid, "killed process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

#[async_trait]
impl ShellExecutor for SystemShell {
    async fn execute(&self, command: &Command) -> Result<ExecutionResult> {
        let start = Instant::now();
        let marker = Self::marker();

        let mut cmd = Self::build(command, &marker);
        cmd.current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| Error::ExecutionFailed(e.to_string()))?;
        let mut group = GroupGuard(child.id());
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::ExecutionFailed(e.to_string()))?;
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let (stdout, cwd) = split_probe(&stdout, &marker);

        debug!(
            command = %command.command_line,
            exit_code = ?output.status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "command finished"
        );

        let mut result = ExecutionResult::new(stdout, stderr).with_duration(start.elapsed());
        if let Some(code) = output.status.code() {
            result = result.with_exit_code(code);
        }
        if let Some(cwd) = cwd {
            result = result.with_cwd(cwd);
        }
        Ok(result)
    }
}
