//! Status stream reported to the UI.
//!
//! One [`StatusReporter`] is created per attempt. The connection manager
//! drives the connection phases, the transfer engine drives progress, and
//! both report errors through the same channel. Consumers hold a
//! `watch::Receiver<Status>` and only ever see the latest snapshot.

use tokio::sync::watch;

use crate::code::SessionCode;
use crate::error::{Error, ErrorKind};

/// Phase of an attempt, in the order an attempt moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Phase {
    /// Nothing started yet
    #[default]
    Idle,
    /// Creating the transport and exchanging the first description
    Initializing,
    /// Published our side, waiting for the peer
    WaitingPeer,
    /// Direct connection established
    Connected,
    /// File bytes are flowing
    Transferring,
    /// Transfer confirmed complete
    Completed,
    /// Terminal failure
    Error,
}

impl Phase {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Error details carried on the status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl From<&Error> for StatusError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Snapshot of an attempt's status.
#[derive(Debug, Clone, Default)]
pub struct Status {
    /// Current phase
    pub phase: Phase,
    /// Session code, once known
    pub code: Option<SessionCode>,
    /// Progress percentage (0 - 100)
    pub progress: u8,
    /// Bytes sent or received so far
    pub bytes_transferred: u64,
    /// Declared file size
    pub total_bytes: u64,
    /// Set when `phase` is [`Phase::Error`]
    pub error: Option<StatusError>,
}

/// Sending half of the status stream.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: watch::Sender<Status>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Create a reporter in the [`Phase::Idle`] phase.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx }
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Latest snapshot.
    #[must_use]
    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }

    /// Move forward to `phase`. Earlier phases and anything after a
    /// terminal phase are ignored.
    pub fn set_phase(&self, phase: Phase) {
        self.tx.send_if_modified(|status| {
            if status.phase.is_terminal() || status.phase >= phase {
                return false;
            }
            tracing::debug!("Phase {:?} -> {:?}", status.phase, phase);
            status.phase = phase;
            true
        });
    }

    /// Record the session code.
    pub fn set_code(&self, code: &SessionCode) {
        self.tx.send_modify(|status| status.code = Some(code.clone()));
    }

    /// Record transfer progress.
    pub fn set_progress(&self, progress: u8, bytes_transferred: u64, total_bytes: u64) {
        self.tx.send_if_modified(|status| {
            if status.phase.is_terminal() {
                return false;
            }
            status.progress = progress.min(100);
            status.bytes_transferred = bytes_transferred;
            status.total_bytes = total_bytes;
            true
        });
    }

    /// Mark the transfer as confirmed complete.
    pub fn complete(&self) {
        self.tx.send_if_modified(|status| {
            if status.phase.is_terminal() {
                return false;
            }
            status.phase = Phase::Completed;
            status.progress = 100;
            true
        });
    }

    /// Report a terminal error. Only the first error is kept.
    pub fn fail(&self, err: &Error) {
        self.tx.send_if_modified(|status| {
            if status.phase.is_terminal() {
                return false;
            }
            tracing::warn!("Attempt failed: {err}");
            status.phase = Phase::Error;
            status.error = Some(StatusError::from(err));
            true
        });
    }
}

/// Integer percentage of `done` over `total`.
///
/// While `cap_below_complete` is set the value never reaches 100, which is
/// reserved for an acknowledged completion.
#[must_use]
pub fn percent(done: u64, total: u64, cap_below_complete: bool) -> u8 {
    let pct = if total == 0 {
        100
    } else {
        (u128::from(done) * 100 / u128::from(total)).min(100) as u8
    };
    if cap_below_complete {
        pct.min(99)
    } else {
        pct
    }
}
