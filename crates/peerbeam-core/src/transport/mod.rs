//! Peer transport abstraction.
//!
//! The connection manager never talks to a concrete peer-connection library.
//! It drives a [`PeerTransport`] created by a [`TransportFactory`] and reacts
//! to the [`TransportEvent`]s the factory hands back. The file transfer runs
//! over a [`DataChannel`] whose events arrive as [`ChannelEvent`]s.
//!
//! Backends:
//! - [`webrtc`] (feature `webrtc`): real peer connections via `webrtc-rs`
//! - [`memory`]: in-process pairs for embedding and tests

pub mod memory;
#[cfg(feature = "webrtc")]
pub mod webrtc;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Kind of a setup description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer from the initiating peer
    Offer,
    /// Answer from the responding peer
    Answer,
}

/// A setup description, in the same JSON shape browsers use:
/// `{"type": "offer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A network candidate, in browser `RTCIceCandidateInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,
    /// Media stream id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media line index
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Candidate with only the candidate line set.
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }
}

/// Negotiation state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No negotiation in progress; both descriptions applied (or none yet)
    Stable,
    /// Local offer applied, waiting for the answer
    HaveLocalOffer,
    /// Remote offer applied, local answer not yet created
    HaveRemoteOffer,
    /// Transport closed
    Closed,
}

/// Connectivity state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Created, nothing happened yet
    New,
    /// Checking candidate pairs
    Connecting,
    /// A candidate pair works
    Connected,
    /// Connectivity temporarily lost
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Closed locally
    Closed,
}

/// Events emitted by a transport.
pub enum TransportEvent {
    /// A local candidate was discovered
    LocalCandidate(IceCandidate),
    /// Connectivity state changed
    StateChanged(PeerState),
    /// The remote peer opened a data channel
    DataChannel(DataChannelHandle),
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            Self::StateChanged(s) => f.debug_tuple("StateChanged").field(s).finish(),
            Self::DataChannel(dc) => f
                .debug_tuple("DataChannel")
                .field(&dc.channel.label())
                .finish(),
        }
    }
}

/// A message on the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// UTF-8 text message
    Text(String),
    /// Binary message
    Binary(Bytes),
}

impl ChannelMessage {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Events emitted by a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel is open for sending
    Open,
    /// A message arrived
    Message(ChannelMessage),
    /// Buffered amount dropped to or below the low threshold
    BufferedAmountLow,
    /// Channel closed
    Closed,
}

/// A reliable, ordered, message-oriented channel.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Channel label.
    fn label(&self) -> &str;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Queue a message for sending.
    async fn send(&self, message: ChannelMessage) -> Result<()>;

    /// Bytes queued but not yet sent.
    async fn buffered_amount(&self) -> usize;

    /// Threshold at or below which [`ChannelEvent::BufferedAmountLow`] fires.
    async fn set_buffered_amount_low_threshold(&self, threshold: usize);

    /// Close the channel.
    async fn close(&self) -> Result<()>;
}

/// A data channel plus the stream of its events.
pub struct DataChannelHandle {
    /// The channel
    pub channel: Arc<dyn DataChannel>,
    /// Its events, in the order they happened
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl std::fmt::Debug for DataChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannelHandle")
            .field("label", &self.channel.label())
            .finish_non_exhaustive()
    }
}

/// One local end of a peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create a locally initiated data channel.
    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle>;

    /// Create an offer and apply it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create an answer and apply it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply the peer's description.
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Add a remote candidate. Fails if no remote description is applied.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Current negotiation state.
    fn signaling_state(&self) -> SignalingState;

    /// Close the transport and every channel on it.
    async fn close(&self) -> Result<()>;
}

/// Creates transports; one per connection attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport and the receiver for its events.
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_json_shape() {
        let offer = SessionDescription::offer("v=0");
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json, serde_json::json!({"type": "offer", "sdp": "v=0"}));
    }

    #[test]
    fn test_candidate_json_shape() {
        let json = r#"{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let candidate: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert!(candidate.username_fragment.is_none());

        let back = serde_json::to_string(&candidate).unwrap();
        assert!(back.contains("\"sdpMLineIndex\":0"));
        assert!(!back.contains("usernameFragment"));
    }

    #[test]
    fn test_channel_message_len() {
        assert_eq!(ChannelMessage::Text("ACK".into()).len(), 3);
        assert!(ChannelMessage::Binary(Bytes::new()).is_empty());
    }
}
