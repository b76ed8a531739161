//! Command execution engine.
//!
//! This module provides the shell-execution collaborator used by the
//! dispatcher:
//! - a [`ShellExecutor`] trait so tests and embedders can swap the shell
//! - [`SystemShell`], which runs commands through the host shell
//! - timeout handling that kills the child when the deadline passes
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cmdlink::execution::{execute_with_timeout, Command, SystemShell};
//!
//! # async fn run() -> cmdlink::Result<()> {
//! let cmd = Command::new("ls", "/tmp").timeout(Duration::from_secs(10));
//! let result = execute_with_timeout(&SystemShell::new(), &cmd).await?;
//! println!("{}", result.render());
//! # Ok(())
//! # }
//! ```

mod command;
mod executor;
mod result;

pub use command::{Command, DEFAULT_TIMEOUT};
pub use executor::{execute_with_timeout, split_probe, ShellExecutor, SystemShell};
pub use result::ExecutionResult;
