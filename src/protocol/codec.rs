//! Length-prefixed framing for raw stream connections.
//!
//! Wire layout of one frame:
//!
//! ```text
//! +-----------+----------------+---------+----------------+---------+-----
//! | count u16 | len u32 (BE)   | bytes   | len u32 (BE)   | bytes   | ...
//! +-----------+----------------+---------+----------------+---------+-----
//! ```
//!
//! Every field carries its own length, so payload bytes can never be
//! mistaken for a delimiter.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Largest accepted field, in bytes.
pub const MAX_FIELD_SIZE: usize = 16 * 1024 * 1024;

/// Largest accepted number of fields in one frame.
pub const MAX_FIELDS: usize = 64;

const COUNT_LEN: usize = 2;
const LENGTH_LEN: usize = 4;

/// One decoded frame: an ordered list of opaque fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub fields: Vec<Bytes>,
}

impl Frame {
    pub fn new(fields: Vec<Bytes>) -> Self {
        Self { fields }
    }

    /// Build a frame from UTF-8 text fields.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: texts
                .into_iter()
                .map(|s| Bytes::from(s.into().into_bytes()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field `index` decoded as UTF-8.
    pub fn text(&self, index: usize) -> crate::Result<String> {
        let field = self.fields.get(index).ok_or_else(|| {
            Error::Protocol(format!(
                "frame has {} fields, field {} requested",
                self.fields.len(),
                index
            ))
        })?;
        String::from_utf8(field.to_vec())
            .map_err(|_| Error::Protocol(format!("field {} is not valid UTF-8", index)))
    }
}

/// Codec for [`Frame`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < COUNT_LEN {
            return Ok(None);
        }

        let count = u16::from_be_bytes([src[0], src[1]]) as usize;
        if count > MAX_FIELDS {
            return Err(Error::Protocol(format!(
                "frame declares {} fields (max {})",
                count, MAX_FIELDS
            )));
        }

        // Walk the length headers without consuming anything until the
        // whole frame is buffered.
        let mut offset = COUNT_LEN;
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            if src.len() < offset + LENGTH_LEN {
                src.reserve(offset + LENGTH_LEN - src.len());
                return Ok(None);
            }
            let len = u32::from_be_bytes([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]) as usize;
            if len > MAX_FIELD_SIZE {
                return Err(Error::FrameTooLarge {
                    size: len,
                    max: MAX_FIELD_SIZE,
                });
            }
            offset += LENGTH_LEN + len;
            if src.len() < offset {
                src.reserve(offset - src.len());
                return Ok(None);
            }
            lengths.push(len);
        }

        src.advance(COUNT_LEN);
        let fields = lengths
            .into_iter()
            .map(|len| {
                src.advance(LENGTH_LEN);
                src.split_to(len).freeze()
            })
            .collect();

        Ok(Some(Frame { fields }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.fields.len() > MAX_FIELDS {
            return Err(Error::Protocol(format!(
                "frame has {} fields (max {})",
                frame.fields.len(),
                MAX_FIELDS
            )));
        }
        if let Some(field) = frame.fields.iter().find(|f| f.len() > MAX_FIELD_SIZE) {
            return Err(Error::FrameTooLarge {
                size: field.len(),
                max: MAX_FIELD_SIZE,
            });
        }

        let total: usize = frame.fields.iter().map(|f| LENGTH_LEN + f.len()).sum();
        dst.reserve(COUNT_LEN + total);
        dst.put_u16(frame.fields.len() as u16);
        for field in &frame.fields {
            dst.put_u32(field.len() as u32);
            dst.extend_from_slice(field);
        }
        Ok(())
    }
}
