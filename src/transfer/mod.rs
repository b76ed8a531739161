//! File transfer subchannel.
//!
//! A transfer always runs on its own TCP connection, separate from the
//! control channel. The sender writes one header [`Frame`] holding
//! `[basename, size]` (size as decimal text), then the raw file bytes, then
//! closes the connection. There is no trailer and no checksum: the close is
//! the end-of-data signal.
//!
//! The executing side dials the controller's [`TransferListener`]; which end
//! sends depends on the intent (`download` sends, `upload` receives).

mod listener;
mod progress;
mod subchannel;

use std::fmt;

pub use listener::{PendingUpload, TransferListener};
pub use progress::{format_bytes, TransferProgress};
pub use subchannel::{open_subchannel, receive_file, send_file, ReceivedFile};

use crate::error::Error;
use crate::protocol::Frame;

/// Default port of the controller's subchannel listener.
pub const DEFAULT_TRANSFER_PORT: u16 = 5002;

/// Size of each chunk written to the subchannel.
pub const CHUNK_SIZE: usize = 4096;

/// Which way the bytes flow, seen from the local end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// Knobs shared by both ends of a transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Reject transfers larger than this. `None` means unlimited.
    pub max_bytes: Option<u64>,
    /// Report progress while bytes flow.
    pub verbose: bool,
}

impl TransferOptions {
    pub fn check_size(&self, size: u64) -> crate::Result<()> {
        match self.max_bytes {
            Some(max) if size > max => Err(Error::TransferTooLarge { size, max }),
            _ => Ok(()),
        }
    }
}

/// Describes the file moving over one subchannel connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// File name with every directory component removed.
    pub name: String,
    /// Size the sender declared, in bytes.
    pub size: u64,
    pub direction: Direction,
}

impl TransferDescriptor {
    pub fn header(&self) -> Frame {
        Frame::from_texts([self.name.clone(), self.size.to_string()])
    }

    /// Parse a received header. The name is confined to a bare basename.
    pub fn from_header(frame: &Frame) -> crate::Result<Self> {
        if frame.len() != 2 {
            return Err(Error::Transfer(format!(
                "header has {} fields, expected 2",
                frame.len()
            )));
        }
        let raw_name = frame.text(0)?;
        let raw_size = frame.text(1)?;
        let size = raw_size
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::MalformedSize(raw_size.clone()))?;
        let name = basename(&raw_name)
            .ok_or_else(|| Error::Transfer(format!("invalid file name {:?}", raw_name)))?;

        Ok(Self {
            name,
            size,
            direction: Direction::Receive,
        })
    }
}

/// Strip any directory component, treating both `/` and `\` as separators.
///
/// Returns `None` for names that do not leave a usable file name.
pub fn basename(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("notes.txt"), Some("notes.txt".into()));
        assert_eq!(basename("/etc/hosts"), Some("hosts".into()));
        assert_eq!(basename("..\\..\\boot.ini"), Some("boot.ini".into()));
        assert_eq!(basename("dir/"), None);
        assert_eq!(basename(".."), None);
        assert_eq!(basename(""), None);
    }

    #[test]
    fn test_header_confines_name() {
        let frame = Frame::from_texts(["../../etc/passwd", "12"]);
        let desc = TransferDescriptor::from_header(&frame).unwrap();
        assert_eq!(desc.name, "passwd");
        assert_eq!(desc.size, 12);
        assert_eq!(desc.direction, Direction::Receive);
    }

    #[test]
    fn test_header_malformed_size() {
        let frame = Frame::from_texts(["a.bin", "12kb"]);
        let err = TransferDescriptor::from_header(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedSize(s) if s == "12kb"));
    }

    #[test]
    fn test_header_field_count() {
        let frame = Frame::from_texts(["a.bin"]);
        assert!(TransferDescriptor::from_header(&frame).is_err());
    }

    #[test]
    fn test_size_limit() {
        let unlimited = TransferOptions::default();
        assert!(unlimited.check_size(u64::MAX).is_ok());

        let capped = TransferOptions {
            max_bytes: Some(10),
            verbose: false,
        };
        assert!(capped.check_size(10).is_ok());
        assert!(matches!(
            capped.check_size(11),
            Err(Error::TransferTooLarge { size: 11, max: 10 })
        ));
    }
}
