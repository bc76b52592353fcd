//! Peer transport backed by `webrtc-rs`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;

use super::{
    ChannelEvent, ChannelMessage, DataChannel, DataChannelHandle, IceCandidate, PeerState,
    PeerTransport, SdpKind, SessionDescription, SignalingState, TransportEvent, TransportFactory,
};
use crate::config::IceConfig;
use crate::error::{Error, Result};

/// Creates `RTCPeerConnection`s with the configured STUN servers.
#[derive(Debug, Clone)]
pub struct WebRtcFactory {
    stun_servers: Vec<String>,
}

impl Default for WebRtcFactory {
    fn default() -> Self {
        Self::from_config(&IceConfig::default())
    }
}

impl WebRtcFactory {
    /// Factory using the given STUN urls.
    #[must_use]
    pub fn new(stun_servers: Vec<String>) -> Self {
        Self { stun_servers }
    }

    /// Factory configured from `[ice]`.
    #[must_use]
    pub fn from_config(config: &IceConfig) -> Self {
        Self::new(config.stun_servers.clone())
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

fn transport_err(e: webrtc::Error) -> Error {
    Error::Transport(e.to_string())
}

fn negotiation_err(e: webrtc::Error) -> Error {
    Error::Negotiation(e.to_string())
}

const fn peer_state(state: RTCPeerConnectionState) -> PeerState {
    match state {
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
        _ => PeerState::New,
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(self.rtc_config())
                .await
                .map_err(transport_err)?,
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let candidates = tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
                let _ = candidates.send(TransportEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                }));
            }
            Box::pin(async {})
        }));

        let states = tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::debug!("Peer connection state: {}", state);
            let _ = states.send(TransportEvent::StateChanged(peer_state(state)));
            Box::pin(async {})
        }));

        let channels = tx;
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let channels = channels.clone();
            Box::pin(async move {
                let handle = wrap_channel(dc).await;
                let _ = channels.send(TransportEvent::DataChannel(handle));
            })
        }));

        let transport: Arc<dyn PeerTransport> = Arc::new(WebRtcTransport { pc });
        Ok((transport, rx))
    }
}

/// Register event handlers on `dc` and wrap it.
async fn wrap_channel(dc: Arc<RTCDataChannel>) -> DataChannelHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let open = tx.clone();
    dc.on_open(Box::new(move || {
        let _ = open.send(ChannelEvent::Open);
        Box::pin(async {})
    }));

    let messages = tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let message = if msg.is_string {
            ChannelMessage::Text(String::from_utf8_lossy(&msg.data).into_owned())
        } else {
            ChannelMessage::Binary(msg.data)
        };
        let _ = messages.send(ChannelEvent::Message(message));
        Box::pin(async {})
    }));

    let low = tx.clone();
    dc.on_buffered_amount_low(Box::new(move || {
        let _ = low.send(ChannelEvent::BufferedAmountLow);
        Box::pin(async {})
    }))
    .await;

    let closed = tx;
    dc.on_close(Box::new(move || {
        let _ = closed.send(ChannelEvent::Closed);
        Box::pin(async {})
    }));

    DataChannelHandle {
        channel: Arc::new(WebRtcChannel { dc }),
        events: rx,
    }
}

struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(transport_err)?;
        Ok(wrap_channel(dc).await)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(negotiation_err)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(negotiation_err)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(negotiation_err)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(negotiation_err)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(negotiation_err)?;

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(negotiation_err)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(transport_err)
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(transport_err)
    }
}

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send(&self, message: ChannelMessage) -> Result<()> {
        match message {
            ChannelMessage::Text(text) => self.dc.send_text(text).await,
            ChannelMessage::Binary(data) => self.dc.send(&data).await,
        }
        .map(|_| ())
        .map_err(transport_err)
    }

    async fn buffered_amount(&self) -> usize {
        self.dc.buffered_amount().await
    }

    async fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.dc.set_buffered_amount_low_threshold(threshold).await;
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await.map_err(transport_err)
    }
}
