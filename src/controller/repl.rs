//! Interactive operator loop.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, warn};

use super::link::ControlLink;
use crate::dispatch::Intent;
use crate::transfer::PendingUpload;
use crate::Result;

/// How a REPL run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplOutcome {
    /// The operator sent `exit`/`quit` and got the final response.
    Exited,
    /// The executing side went away.
    Disconnected,
    /// The operator's input reached EOF.
    InputClosed,
}

/// Reads operator lines, forwards them and prints the replies.
///
/// The prompt shows the cwd from the latest response. Input persists across
/// runs so one REPL can serve several agents in turn.
pub struct Repl<I, O> {
    input: Lines<I>,
    output: O,
    pending: Option<PendingUpload>,
}

impl<I, O> Repl<I, O>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    pub fn new(input: I, output: O) -> Self {
        Self {
            input: input.lines(),
            output,
            pending: None,
        }
    }

    /// Serve `upload` from this slot.
    pub fn with_pending(mut self, pending: PendingUpload) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Run against one connected executing side.
    pub async fn run<L>(&mut self, link: &mut L) -> Result<ReplOutcome>
    where
        L: ControlLink + ?Sized,
    {
        let welcome = match link.recv_response().await? {
            Some(welcome) => welcome,
            None => {
                self.print("Connection closed by remote host").await?;
                return Ok(ReplOutcome::Disconnected);
            }
        };
        self.print(welcome.text()).await?;
        let mut cwd = welcome.cwd().to_string();

        loop {
            self.output
                .write_all(format!("{} $> ", cwd).as_bytes())
                .await?;
            self.output.flush().await?;

            let line = match self.input.next_line().await? {
                Some(line) => line,
                None => return Ok(ReplOutcome::InputClosed),
            };
            let command = line.trim();
            if command.is_empty() {
                continue;
            }

            let intent = Intent::parse(command);
            if let Intent::Upload(ref path) = intent {
                if !self.arm_upload(path).await? {
                    continue;
                }
            }

            link.send_command(command).await?;
            let response = match link.recv_response().await? {
                Some(response) => response,
                None => {
                    self.print("Connection closed by remote host").await?;
                    return Ok(ReplOutcome::Disconnected);
                }
            };
            if matches!(intent, Intent::Upload(_)) {
                self.release_upload();
            }

            if !response.text().is_empty() {
                self.print(response.text()).await?;
            }
            cwd = response.cwd().to_string();

            if intent == Intent::Exit {
                return Ok(ReplOutcome::Exited);
            }
        }
    }

    /// Check the local file and arm the slot. `false` means do not send.
    async fn arm_upload(&mut self, path: &str) -> Result<bool> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            self.print(&format!("The file {} does not exist", path))
                .await?;
            return Ok(false);
        }

        match self.pending {
            Some(ref pending) => {
                pending.arm(PathBuf::from(path))?;
                debug!(file = path, "upload armed");
                Ok(true)
            }
            None => {
                self.print("File transfer is not available").await?;
                Ok(false)
            }
        }
    }

    /// Clear a slot the executing side never collected.
    fn release_upload(&self) {
        if let Some(ref pending) = self.pending {
            match pending.disarm() {
                Ok(Some(path)) => warn!(file = %path.display(), "upload was never collected"),
                Ok(None) => {}
                Err(e) => warn!("pending upload slot unavailable: {}", e),
            }
        }
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.output.write_all(b"\n").await?;
        }
        self.output.flush().await?;
        Ok(())
    }
}
