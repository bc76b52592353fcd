//! Error types for PeerBeam.
//!
//! Every failure in the connection manager and transfer engine is one of the
//! variants below. Errors never escape a running attempt as a panic: they are
//! reported on the status stream (see [`crate::status`]) and put the attempt
//! into its terminal error phase.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A specialized `Result` type for PeerBeam operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for PeerBeam.
#[derive(Error, Debug)]
pub enum Error {
    /// Rendezvous request failed (E001)
    #[error("signaling request failed: {0}")]
    Signaling(String),

    /// Unknown or expired session code (E002)
    #[error("session '{0}' not found or expired")]
    SessionNotFound(String),

    /// Offer or answer was malformed or rejected (E003)
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The peer transport reported a connectivity failure (E004)
    #[error("transport failed: {0}")]
    Transport(String),

    /// Local file could not be read (E005)
    #[error("cannot read '{path}': {reason}")]
    Read {
        /// File being read
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Invalid code format
    #[error("invalid code format: {0}")]
    InvalidCodeFormat(String),

    /// Every generated code collided with a live session
    #[error("unable to allocate a unique session code after {0} attempts")]
    CodeCollision(usize),

    /// Unexpected or malformed data channel frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Attempt was stopped
    #[error("attempt cancelled")]
    Cancelled,

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Self::Signaling(m) => Self::Signaling(m.clone()),
            Self::SessionNotFound(c) => Self::SessionNotFound(c.clone()),
            Self::Negotiation(m) => Self::Negotiation(m.clone()),
            Self::Transport(m) => Self::Transport(m.clone()),
            Self::Read { path, reason } => Self::Read {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::InvalidCodeFormat(m) => Self::InvalidCodeFormat(m.clone()),
            Self::CodeCollision(n) => Self::CodeCollision(*n),
            Self::Protocol(m) => Self::Protocol(m.clone()),
            Self::Cancelled => Self::Cancelled,
            Self::Timeout(s) => Self::Timeout(*s),
            Self::ConfigError(m) => Self::ConfigError(m.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Serialization(m) => Self::Serialization(m.clone()),
            Self::Internal(m) => Self::Internal(m.clone()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Signaling(err.to_string())
    }
}

/// Coarse error category carried on the status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rendezvous HTTP failure
    Signaling,
    /// Unknown/expired code at receiver startup
    SessionNotFound,
    /// Malformed or rejected offer/answer
    Negotiation,
    /// Connectivity failure of the peer transport
    Transport,
    /// Local file read failure
    Read,
    /// Attempt stopped by the user
    Cancelled,
    /// Anything else
    Other,
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Signaling(_) => Some("E001"),
            Self::SessionNotFound(_) => Some("E002"),
            Self::Negotiation(_) => Some("E003"),
            Self::Transport(_) => Some("E004"),
            Self::Read { .. } => Some("E005"),
            _ => None,
        }
    }

    /// Returns the category reported on the status stream.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Signaling(_) => ErrorKind::Signaling,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::Negotiation(_) => ErrorKind::Negotiation,
            Self::Transport(_) | Self::Protocol(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Read { .. } => ErrorKind::Read,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Build a read error for `path`.
    pub fn read(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SessionNotFound(_) => Some(
                "Codes expire one hour after creation and stop working once a\n\
                 transfer connects. Ask the sender for a fresh code.",
            ),
            Self::Signaling(_) => Some(
                "Check that the rendezvous server is reachable:\n\
                   peerbeam serve            (run one locally)\n\
                   peerbeam config show      (check signaling.url)",
            ),
            Self::Transport(_) => Some(
                "The direct connection could not be established or was lost.\n\
                 Both peers need to start again with a new code.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Signaling("x".into()).code(), Some("E001"));
        assert_eq!(Error::SessionNotFound("123456".into()).code(), Some("E002"));
        assert_eq!(Error::read("a.txt", "denied").code(), Some("E005"));
        assert_eq!(Error::Cancelled.code(), None);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::Transport("ice".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::Protocol("bad".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            Error::SessionNotFound("000000".into()).kind(),
            ErrorKind::SessionNotFound
        );
        assert_eq!(Error::ConfigError("x".into()).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_display() {
        let err = Error::SessionNotFound("482913".into());
        assert!(err.to_string().contains("482913"));

        let err = Error::read("notes.txt", "permission denied");
        assert_eq!(
            err.to_string(),
            "cannot read 'notes.txt': permission denied"
        );
    }

    #[test]
    fn test_clone_keeps_io_kind() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        match err.clone() {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::SessionNotFound).unwrap();
        assert_eq!(json, "\"session_not_found\"");
    }
}
