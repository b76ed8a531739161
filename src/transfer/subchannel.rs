//! Both ends of one subchannel connection.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Encoder, FramedRead};
use tracing::{debug, warn};

use super::progress::TransferProgress;
use super::{basename, Direction, TransferDescriptor, TransferOptions, CHUNK_SIZE};
use crate::error::Error;
use crate::protocol::FrameCodec;
use crate::Result;

/// Outcome of a completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Size announced in the header.
    pub declared: u64,
    /// Bytes actually written.
    pub received: u64,
}

/// Dial a subchannel listener.
pub async fn open_subchannel(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            debug!(%addr, "subchannel connected");
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::Transfer(format!("cannot reach {}: {}", addr, e))),
        Err(_) => Err(Error::Transfer(format!("timed out connecting to {}", addr))),
    }
}

/// Send the file at `path`: header, bytes, then close.
///
/// Returns the number of payload bytes written.
pub async fn send_file<S>(mut stream: S, path: &Path, options: &TransferOptions) -> Result<u64>
where
    S: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await?;
    let size = file.metadata().await?.len();
    options.check_size(size)?;

    let name = basename(&path.to_string_lossy())
        .ok_or_else(|| Error::Transfer(format!("invalid file name {:?}", path)))?;
    let descriptor = TransferDescriptor {
        name,
        size,
        direction: Direction::Send,
    };

    let mut header = BytesMut::new();
    FrameCodec.encode(descriptor.header(), &mut header)?;
    stream.write_all(&header).await?;

    let mut progress = TransferProgress::new(&descriptor.name, Direction::Send, size, options.verbose);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        progress.advance(n as u64);
    }
    stream.flush().await?;
    stream.shutdown().await?;
    progress.finish();

    Ok(progress.transferred())
}

/// Receive one file into `dest_dir`, stored under the header's basename.
///
/// Bytes are written in arrival order until the peer closes. A failure
/// part-way leaves the partial file on disk.
pub async fn receive_file<S>(
    stream: S,
    dest_dir: &Path,
    options: &TransferOptions,
) -> Result<ReceivedFile>
where
    S: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(stream, FrameCodec);
    let header = match framed.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return Err(Error::Transfer(format!("bad header: {}", e))),
        None => {
            return Err(Error::Transfer(
                "connection closed before header".to_string(),
            ))
        }
    };
    let descriptor = TransferDescriptor::from_header(&header)?;
    options.check_size(descriptor.size)?;

    // The framed reader may already hold the first payload bytes.
    let leftover = framed.read_buffer().clone();
    let mut stream = framed.into_inner();

    let path = dest_dir.join(&descriptor.name);
    let mut file = File::create(&path).await?;
    let mut progress = TransferProgress::new(
        &descriptor.name,
        Direction::Receive,
        descriptor.size,
        options.verbose,
    );

    if !leftover.is_empty() {
        options.check_size(leftover.len() as u64)?;
        file.write_all(&leftover).await?;
        progress.advance(leftover.len() as u64);
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        options.check_size(progress.transferred() + n as u64)?;
        file.write_all(&buf[..n]).await?;
        progress.advance(n as u64);
    }
    file.flush().await?;
    progress.finish();

    if progress.transferred() != descriptor.size {
        warn!(
            file = %descriptor.name,
            declared = descriptor.size,
            received = progress.transferred(),
            "transfer size mismatch"
        );
    }

    Ok(ReceivedFile {
        path,
        declared: descriptor.size,
        received: progress.transferred(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;

    fn header_bytes(name: &str, size: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        FrameCodec
            .encode(Frame::from_texts([name, size]), &mut buf)
            .unwrap();
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_receive_from_mock_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut wire = header_bytes("../secret.txt", "11");
        wire.extend_from_slice(b"hello");
        let io = tokio_test::io::Builder::new()
            .read(&wire)
            .read(b" world")
            .build();

        let received = receive_file(io, dir.path(), &TransferOptions::default())
            .await
            .unwrap();

        assert_eq!(received.path, dir.path().join("secret.txt"));
        assert_eq!(received.received, 11);
        assert_eq!(std::fs::read(&received.path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_receive_malformed_size() {
        let dir = tempfile::tempdir().unwrap();
        let wire = header_bytes("a.bin", "lots");
        let io = tokio_test::io::Builder::new().read(&wire).build();

        let err = receive_file(io, dir.path(), &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedSize(_)));
        assert!(!dir.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn test_receive_enforces_limit_on_actual_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut wire = header_bytes("small.bin", "2");
        wire.extend_from_slice(b"way more than two bytes");
        let io = tokio_test::io::Builder::new().read(&wire).build();
        let options = TransferOptions {
            max_bytes: Some(4),
            verbose: false,
        };

        let err = receive_file(io, dir.path(), &options).await.unwrap_err();
        assert!(matches!(err, Error::TransferTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_receive_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let io = tokio_test::io::Builder::new().build();
        let err = receive_file(io, dir.path(), &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
    }

    #[tokio::test]
    async fn test_send_writes_header_then_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"abc").unwrap();

        let mut expected = header_bytes("data.txt", "3");
        expected.extend_from_slice(b"abc");
        let io = tokio_test::io::Builder::new().write(&expected).build();

        let sent = send_file(io, &path, &TransferOptions::default()).await.unwrap();
        assert_eq!(sent, 3);
    }
}
