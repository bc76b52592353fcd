//! # PeerBeam Core Library
//!
//! `peerbeam-core` moves a single file between two peers over a direct
//! data channel. A small rendezvous service only relays the connection
//! setup (offer, answer and network candidates); file bytes never touch it.
//!
//! ## Features
//!
//! - **Code-based rendezvous**: 6-digit numeric codes locate a session
//! - **Trickle candidates**: candidates found before a code exists are
//!   buffered and flushed in order
//! - **Flow control**: chunked sends pause on the channel's buffered amount
//! - **Confirmed completion**: the sender only reports success after the
//!   receiver acknowledges the full file
//!
//! ## Modules
//!
//! - [`code`] - Session code generation and validation
//! - [`config`] - Configuration management
//! - [`connection`] - Per-attempt connection state machine
//! - [`mod@file`] - File metadata and output helpers
//! - [`rendezvous`] - TTL-backed session store (and HTTP server with `server`)
//! - [`signaling`] - Rendezvous client API and wire types
//! - [`status`] - Status stream reported to the UI
//! - [`transfer`] - Chunked transfer engine and send/receive sessions
//! - [`transport`] - Peer transport abstraction and backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use peerbeam_core::transfer::{SendSession, ReceiveSession};
//!
//! let session = SendSession::start(ctx.clone(), "file.txt".as_ref()).await?;
//! println!("Code: {}", session.code());
//! session.run().await?;
//!
//! // On the other peer
//! let receiver = ReceiveSession::start(ctx, &code).await?;
//! let path = receiver.run(output_dir).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod code;
pub mod config;
pub mod connection;
pub mod error;
pub mod file;
pub mod rendezvous;
pub mod signaling;
pub mod status;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lifetime of a rendezvous session, counted from creation (1 hour).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Canonical chunk size for file transfers (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered amount above which the sender pauses (1 MiB)
pub const DEFAULT_BUFFERED_LOW_THRESHOLD: usize = 1024 * 1024;

/// Interval between rendezvous polls, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default rendezvous server port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default rendezvous server URL used by clients
pub const DEFAULT_SIGNALING_URL: &str = "http://127.0.0.1:3000";

/// Default STUN server for candidate discovery
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Label of the file transfer data channel
pub const DATA_CHANNEL_LABEL: &str = "file-transfer";
