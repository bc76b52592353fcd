//! JSON bodies of the rendezvous HTTP API.
//!
//! Shared by the server handlers and [`super::HttpSignalingClient`] so both
//! ends agree on field names (`lastIndex`, `type`, ...).

use serde::{Deserialize, Serialize};

use super::IceOrigin;
use crate::code::SessionCode;
use crate::transport::{IceCandidate, SessionDescription};

/// `POST /session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Sender's offer
    pub offer: SessionDescription,
}

/// Response to `POST /session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// Assigned code
    pub code: SessionCode,
}

/// Response to `GET /session/{code}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSessionResponse {
    /// Sender's offer
    pub offer: SessionDescription,
}

/// `POST /answer/{code}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Receiver's answer
    pub answer: SessionDescription,
}

/// Response to `GET /answer/{code}`; `null` while not yet posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// Receiver's answer, if posted
    pub answer: Option<SessionDescription>,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Always `true` on success
    pub success: bool,
}

impl SuccessResponse {
    /// A successful acknowledgement.
    pub const fn ok() -> Self {
        Self { success: true }
    }
}

/// `POST /ice/{code}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceRequest {
    /// Candidate to append
    pub candidate: IceCandidate,
    /// Which list to append to
    #[serde(rename = "type")]
    pub origin: IceOrigin,
}

/// Query string of `GET /ice/{code}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceQuery {
    /// Which list to read
    #[serde(rename = "type")]
    pub origin: IceOrigin,
    /// First index to return
    #[serde(default)]
    pub last_index: usize,
}

/// Error body returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Error code (e.g. "E002"), when one applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
