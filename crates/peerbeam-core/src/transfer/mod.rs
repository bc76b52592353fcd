//! File transfer sessions for PeerBeam.
//!
//! A transfer is one [`PeerLink`] plus the chunked engine running on its
//! data channel:
//!
//! - [`SendSession`] publishes an offer, hands out the session code and
//!   streams the file once the receiver connects
//! - [`ReceiveSession`] joins with a code, reassembles the file and
//!   acknowledges it
//!
//! ## Transfer Protocol
//!
//! - Metadata frame first, as JSON text
//! - Binary chunks of exactly `chunk_size` bytes (default 64 KiB), the last
//!   one possibly shorter
//! - A single `ACK` text frame from the receiver once every byte arrived
//!
//! See [`frame`] for the wire format and [`engine`] for flow control.

pub mod engine;
pub mod frame;

pub use engine::{receive_file, send_file, ReceivedFile};
pub use frame::Frame;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::code::SessionCode;
use crate::connection::{LinkConfig, PeerLink};
use crate::error::Result;
use crate::file::{self, FileMetadata};
use crate::signaling::Signaling;
use crate::status::Status;
use crate::transport::TransportFactory;

/// How long the receiver waits for the sender to close after `ACK`.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk size in bytes
    pub chunk_size: usize,
    /// Buffered amount above which the sender pauses
    pub buffered_low_threshold: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            buffered_low_threshold: crate::DEFAULT_BUFFERED_LOW_THRESHOLD,
        }
    }
}

/// Everything a session needs to reach its peer.
#[derive(Clone)]
pub struct SessionContext {
    /// Rendezvous client
    pub signaling: Arc<dyn Signaling>,
    /// Transport backend
    pub factory: Arc<dyn TransportFactory>,
    /// Connection settings
    pub link: LinkConfig,
    /// Engine settings
    pub transfer: TransferConfig,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("link", &self.link)
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Context with default connection and engine settings.
    pub fn new(signaling: Arc<dyn Signaling>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            signaling,
            factory,
            link: LinkConfig::default(),
            transfer: TransferConfig::default(),
        }
    }

    /// Replace the connection settings.
    #[must_use]
    pub fn with_link_config(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Replace the engine settings.
    #[must_use]
    pub fn with_transfer_config(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    fn link(&self) -> PeerLink {
        PeerLink::new(
            Arc::clone(&self.signaling),
            Arc::clone(&self.factory),
            self.link.clone(),
        )
    }
}

/// A send session (sender side).
#[derive(Debug)]
pub struct SendSession {
    link: PeerLink,
    code: SessionCode,
    path: PathBuf,
    metadata: FileMetadata,
    config: TransferConfig,
}

impl SendSession {
    /// Publish an offer for `path` and obtain the session code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`](crate::Error::Read) if the file is missing
    /// (before anything is published), or the connection error otherwise.
    pub async fn start(ctx: SessionContext, path: &Path) -> Result<Self> {
        let metadata = FileMetadata::from_path(path).await?;
        let link = ctx.link();
        let code = link.start_sender().await?;

        Ok(Self {
            link,
            code,
            path: path.to_path_buf(),
            metadata,
            config: ctx.transfer,
        })
    }

    /// The code to share with the receiver.
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// Metadata of the file being sent.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.link.status()
    }

    /// Handle to the underlying attempt, e.g. to stop it from another task.
    pub fn link(&self) -> PeerLink {
        self.link.clone()
    }

    /// Wait for the receiver and send the file.
    ///
    /// Returns once the receiver acknowledged the whole file. The attempt is
    /// stopped afterwards either way.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the connection or the transfer. When
    /// the attempt was failed from outside (e.g. a connect timeout), that
    /// failure is returned rather than the channel error it caused.
    pub async fn run(self) -> Result<u64> {
        let result = settle(&self.link, self.transfer().await).await;
        self.link.stop().await;
        result
    }

    async fn transfer(&self) -> Result<u64> {
        let mut handle = self.link.take_channel().await?;
        let sent = send_file(
            &mut handle,
            &self.path,
            &self.metadata,
            &self.config,
            self.link.reporter(),
        )
        .await?;
        let _ = handle.channel.close().await;
        Ok(sent)
    }
}

/// A receive session (receiver side).
#[derive(Debug)]
pub struct ReceiveSession {
    link: PeerLink,
    code: SessionCode,
}

impl ReceiveSession {
    /// Join the session behind `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`](crate::Error::SessionNotFound)
    /// when the code is unknown or expired.
    pub async fn start(ctx: SessionContext, code: &SessionCode) -> Result<Self> {
        let link = ctx.link();
        link.start_receiver(code).await?;
        Ok(Self {
            link,
            code: code.clone(),
        })
    }

    /// The code this session joined.
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.link.status()
    }

    /// Handle to the underlying attempt, e.g. to stop it from another task.
    pub fn link(&self) -> PeerLink {
        self.link.clone()
    }

    /// Receive the file into memory.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the connection or the transfer.
    pub async fn receive(self) -> Result<ReceivedFile> {
        let result = settle(&self.link, self.transfer().await).await;
        self.link.stop().await;
        result
    }

    /// Receive the file and write it under `output_dir`.
    ///
    /// The name announced by the sender is sanitized and never overwrites an
    /// existing file. Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns the transfer failure, or an I/O error if the file cannot be
    /// written.
    pub async fn run(self, output_dir: &Path) -> Result<PathBuf> {
        let file = self.receive().await?;
        file::write_received(output_dir, &file.metadata.name, &file.data).await
    }

    async fn transfer(&self) -> Result<ReceivedFile> {
        let mut handle = self.link.take_channel().await?;
        let file = receive_file(&mut handle, self.link.reporter()).await?;

        // Let the sender see ACK before the transport goes away.
        if tokio::time::timeout(CLOSE_GRACE, engine::wait_closed(&mut handle))
            .await
            .is_err()
        {
            tracing::debug!("Sender did not close the channel, closing locally");
        }
        let _ = handle.channel.close().await;
        Ok(file)
    }
}

/// Report a transfer error on the link, preferring a failure already recorded.
async fn settle<T>(link: &PeerLink, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Some(first) = link.failure().await {
                return Err(first);
            }
            link.fail(&e).await;
            Err(e)
        }
    }
}
