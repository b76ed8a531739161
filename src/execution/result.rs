//! Execution result types.

use std::path::PathBuf;
use std::time::Duration;

/// What the shell reported back for one command.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Working directory the shell ended in, when it could be probed.
    pub cwd: Option<PathBuf>,
    /// Wall-clock execution time.
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text shown to the controller: stdout, then stderr under an
    /// `Error:` heading when there was any.
    pub fn render(&self) -> String {
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            output.push_str("\nError: ");
            output.push_str(&self.stderr);
        }
        output
    }
}
