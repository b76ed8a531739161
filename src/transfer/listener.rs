//! Controller-side subchannel listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::progress::format_bytes;
use super::subchannel::{receive_file, send_file};
use super::TransferOptions;
use crate::error::Error;
use crate::Result;

/// Slot holding the local file to serve on the next subchannel connection.
///
/// Armed by the controller right before it forwards `upload <path>`; an
/// accepted connection takes the slot and sends that file. With the slot
/// empty the connection is treated as an incoming download.
#[derive(Debug, Clone, Default)]
pub struct PendingUpload {
    slot: Arc<Mutex<Option<PathBuf>>>,
}

impl PendingUpload {
    pub fn arm(&self, path: impl Into<PathBuf>) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|_| Error::LockPoisoned)?;
        *slot = Some(path.into());
        Ok(())
    }

    /// Clear the slot, returning what was armed.
    pub fn disarm(&self) -> Result<Option<PathBuf>> {
        let mut slot = self.slot.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(slot.take())
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

/// Accepts subchannel connections and serves each one to completion.
pub struct TransferListener {
    listener: TcpListener,
    pending: PendingUpload,
    download_dir: PathBuf,
    options: TransferOptions,
}

impl TransferListener {
    pub async fn bind(
        addr: &str,
        download_dir: impl Into<PathBuf>,
        options: TransferOptions,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            pending: PendingUpload::default(),
            download_dir: download_dir.into(),
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for arming uploads from the REPL.
    pub fn pending(&self) -> PendingUpload {
        self.pending.clone()
    }

    /// Accept connections forever. Failures are logged per connection and
    /// never stop the loop.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let upload = match self.pending.disarm() {
                        Ok(upload) => upload,
                        Err(e) => {
                            warn!(%peer, "pending upload slot unavailable: {}", e);
                            None
                        }
                    };
                    let dir = self.download_dir.clone();
                    let options = self.options.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, peer, upload, &dir, &options).await;
                    });
                }
                Err(e) => warn!("subchannel accept failed: {}", e),
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    upload: Option<PathBuf>,
    download_dir: &Path,
    options: &TransferOptions,
) {
    match upload {
        Some(path) => match send_file(stream, &path, options).await {
            Ok(bytes) => info!(
                %peer,
                file = %path.display(),
                size = %format_bytes(bytes),
                "upload sent"
            ),
            Err(e) => warn!(%peer, file = %path.display(), "upload failed: {}", e),
        },
        None => match receive_file(stream, download_dir, options).await {
            Ok(received) => info!(
                %peer,
                file = %received.path.display(),
                size = %format_bytes(received.received),
                "download saved"
            ),
            Err(e) => warn!(%peer, "download failed: {}", e),
        },
    }
}
