//! Control-channel message types shared by both transports.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::codec::{Frame, MAX_FIELD_SIZE};
use crate::error::Error;

/// Longest output text a response carries. Anything past it is dropped
/// so the response still fits in one frame field.
pub const MAX_OUTPUT_LEN: usize = MAX_FIELD_SIZE - 4096;

/// A command sent by the controller.
///
/// Over WebSocket this is `{"command": "..."}`; any other fields (such as
/// `type`) are ignored and a missing command is treated as empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: String,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::from_texts([self.command.as_str()])
    }

    pub fn from_frame(frame: &Frame) -> crate::Result<Self> {
        Ok(Self::new(frame.text(0)?))
    }
}

/// A response from the executing side. Every variant carries the session's
/// working directory at the time it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Sent once, right after the handshake.
    Welcome { message: String, cwd: String },
    /// Result of a command.
    Output { output: String, cwd: String },
    /// The command could not be understood.
    Error { output: String, cwd: String },
}

impl Response {
    pub fn welcome(host: &str, cwd: &Path) -> Self {
        let cwd = cwd.display().to_string();
        Response::Welcome {
            message: format!("Connected to {}. CWD: {}", host, cwd),
            cwd,
        }
    }

    pub fn output(output: impl Into<String>, cwd: &Path) -> Self {
        Response::Output {
            output: clip(output.into()),
            cwd: cwd.display().to_string(),
        }
    }

    pub fn error(output: impl Into<String>, cwd: &Path) -> Self {
        Response::Error {
            output: clip(output.into()),
            cwd: cwd.display().to_string(),
        }
    }

    /// Wire tag, identical for both transports.
    pub fn tag(&self) -> &'static str {
        match self {
            Response::Welcome { .. } => "welcome",
            Response::Output { .. } => "output",
            Response::Error { .. } => "error",
        }
    }

    /// Message text for welcome, output text otherwise.
    pub fn text(&self) -> &str {
        match self {
            Response::Welcome { message, .. } => message,
            Response::Output { output, .. } | Response::Error { output, .. } => output,
        }
    }

    pub fn cwd(&self) -> &str {
        match self {
            Response::Welcome { cwd, .. }
            | Response::Output { cwd, .. }
            | Response::Error { cwd, .. } => cwd,
        }
    }

    /// Stream encoding: `[tag, text, cwd]`.
    pub fn to_frame(&self) -> Frame {
        Frame::from_texts([self.tag(), self.text(), self.cwd()])
    }

    pub fn from_frame(frame: &Frame) -> crate::Result<Self> {
        if frame.len() != 3 {
            return Err(Error::Protocol(format!(
                "response frame has {} fields, expected 3",
                frame.len()
            )));
        }
        let (tag, text, cwd) = (frame.text(0)?, frame.text(1)?, frame.text(2)?);
        match tag.as_str() {
            "welcome" => Ok(Response::Welcome { message: text, cwd }),
            "output" => Ok(Response::Output { output: text, cwd }),
            "error" => Ok(Response::Error { output: text, cwd }),
            other => Err(Error::Protocol(format!("unknown response tag {:?}", other))),
        }
    }
}

/// Cut `text` to [`MAX_OUTPUT_LEN`] on a char boundary and say how much
/// was left out.
fn clip(mut text: String) -> String {
    if text.len() <= MAX_OUTPUT_LEN {
        return text;
    }
    let mut end = MAX_OUTPUT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let omitted = text.len() - end;
    text.truncate(end);
    text.push_str(&format!("\n[output truncated: {} bytes omitted]", omitted));
    text
}
