//! Command representation handed to the shell executor.

use std::path::PathBuf;
use std::time::Duration;

/// Default generic-exec timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A command line bound to the working directory it must run in.
#[derive(Debug, Clone)]
pub struct Command {
    /// The command line to execute.
    pub command_line: String,
    /// Directory the command runs in (the session's cwd).
    pub working_dir: PathBuf,
    /// Maximum execution time.
    pub timeout: Duration,
}

impl Command {
    /// Create a new command running in `working_dir` with the default timeout.
    pub fn new(command_line: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command_line: command_line.into(),
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }
}
