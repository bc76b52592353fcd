//! In-process transport backend.
//!
//! [`MemoryNetwork`] hands out transports that negotiate with each other
//! inside one process. Offers and answers carry the creating transport's id,
//! so descriptions still have to travel through signaling for two transports
//! to find each other. A pair connects once both descriptions are applied
//! and each side has added at least one remote candidate, which mirrors the
//! order of events a real peer connection needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    ChannelEvent, ChannelMessage, DataChannel, DataChannelHandle, IceCandidate, PeerState,
    PeerTransport, SdpKind, SessionDescription, SignalingState, TransportEvent, TransportFactory,
};
use crate::error::{Error, Result};

const PEER_ATTRIBUTE: &str = "a=x-memory-peer:";

/// Local candidates announced per description.
const CANDIDATES_PER_PEER: u64 = 2;

/// Factory for in-process transports that can reach each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    shared: Arc<Mutex<Network>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("created", &self.created())
            .finish()
    }
}

#[derive(Default)]
struct Network {
    next_id: u64,
    created: usize,
    peers: HashMap<u64, PeerSlot>,
}

struct PeerSlot {
    events: mpsc::UnboundedSender<TransportEvent>,
    local: Option<SessionDescription>,
    remote_peer: Option<u64>,
    signaling: SignalingState,
    remote_candidates: usize,
    connected: bool,
    pending_channels: Vec<Arc<Endpoint>>,
    channels: Vec<Weak<Endpoint>>,
}

impl PeerSlot {
    fn ready(&self) -> bool {
        self.local.is_some()
            && self.remote_peer.is_some()
            && self.signaling == SignalingState::Stable
            && self.remote_candidates > 0
            && !self.connected
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transports created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.lock().map(|n| n.created).unwrap_or_default()
    }

    /// Number of transports not closed yet.
    #[must_use]
    pub fn open_transports(&self) -> usize {
        self.shared.lock().map(|n| n.peers.len()).unwrap_or_default()
    }

    /// Report a connectivity failure on every open transport.
    pub fn fail_connections(&self) {
        if let Ok(network) = self.shared.lock() {
            for slot in network.peers.values() {
                slot.emit(TransportEvent::StateChanged(PeerState::Failed));
            }
        }
    }
}

#[async_trait]
impl TransportFactory for MemoryNetwork {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut network = lock(&self.shared)?;
        network.next_id += 1;
        network.created += 1;
        let id = network.next_id;
        network.peers.insert(
            id,
            PeerSlot {
                events: tx,
                local: None,
                remote_peer: None,
                signaling: SignalingState::Stable,
                remote_candidates: 0,
                connected: false,
                pending_channels: Vec::new(),
                channels: Vec::new(),
            },
        );
        tracing::debug!("Created memory transport {}", id);

        let transport: Arc<dyn PeerTransport> = Arc::new(MemoryTransport {
            shared: Arc::clone(&self.shared),
            id,
        });
        Ok((transport, rx))
    }
}

fn lock(shared: &Mutex<Network>) -> Result<MutexGuard<'_, Network>> {
    shared
        .lock()
        .map_err(|_| Error::Internal("memory network lock poisoned".into()))
}

fn peer_id(description: &SessionDescription) -> Result<u64> {
    description
        .sdp
        .lines()
        .find_map(|line| line.strip_prefix(PEER_ATTRIBUTE))
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| Error::Negotiation("description does not name a memory peer".into()))
}

fn describe(id: u64) -> String {
    format!("v=0\r\no=- {id} 0 IN IP4 127.0.0.1\r\ns=-\r\n{PEER_ATTRIBUTE}{id}\r\n")
}

/// One end of an in-process transport pair.
struct MemoryTransport {
    shared: Arc<Mutex<Network>>,
    id: u64,
}

impl MemoryTransport {
    fn with_slot<T>(&self, f: impl FnOnce(&mut Network, u64) -> Result<T>) -> Result<T> {
        let mut network = lock(&self.shared)?;
        let open = network
            .peers
            .get(&self.id)
            .is_some_and(|slot| slot.signaling != SignalingState::Closed);
        if !open {
            return Err(Error::Transport("transport is closed".into()));
        }
        f(&mut network, self.id)
    }

    fn set_local(network: &mut Network, id: u64, description: &SessionDescription) {
        if let Some(slot) = network.peers.get_mut(&id) {
            slot.local = Some(description.clone());
            for n in 0..CANDIDATES_PER_PEER {
                slot.emit(TransportEvent::LocalCandidate(IceCandidate::new(format!(
                    "candidate:{n} 1 udp 2130706431 127.0.0.1 {} typ host",
                    40_000 + id * CANDIDATES_PER_PEER + n
                ))));
            }
        }
    }
}

/// Connect `id` and its remote peer if both sides are ready.
fn try_connect(network: &mut Network, id: u64) {
    let Some(remote) = network.peers.get(&id).and_then(|s| s.remote_peer) else {
        return;
    };
    let both_ready = network.peers.get(&id).is_some_and(PeerSlot::ready)
        && network
            .peers
            .get(&remote)
            .is_some_and(|s| s.ready() && s.remote_peer == Some(id));
    if !both_ready {
        return;
    }

    let mut pairs = Vec::new();
    for (from, to) in [(id, remote), (remote, id)] {
        let pending = network
            .peers
            .get_mut(&from)
            .map(|s| std::mem::take(&mut s.pending_channels))
            .unwrap_or_default();
        pairs.extend(pending.into_iter().map(|local| (local, to)));
    }

    for slot_id in [id, remote] {
        if let Some(slot) = network.peers.get_mut(&slot_id) {
            slot.connected = true;
            slot.emit(TransportEvent::StateChanged(PeerState::Connecting));
            slot.emit(TransportEvent::StateChanged(PeerState::Connected));
        }
    }

    for (local, to) in pairs {
        let (tx, rx) = mpsc::unbounded_channel();
        let remote_end = Arc::new(Endpoint::new(local.label.clone(), tx));
        local.link(&remote_end);

        if let Some(slot) = network.peers.get_mut(&to) {
            slot.channels.push(Arc::downgrade(&remote_end));
            local.open();
            remote_end.open();
            slot.emit(TransportEvent::DataChannel(DataChannelHandle {
                channel: Arc::new(MemoryChannel(remote_end)),
                events: rx,
            }));
        }
    }
    tracing::debug!("Memory transports {} and {} connected", id, remote);
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle> {
        self.with_slot(|network, id| {
            let (tx, rx) = mpsc::unbounded_channel();
            let endpoint = Arc::new(Endpoint::new(label.to_string(), tx));
            if let Some(slot) = network.peers.get_mut(&id) {
                slot.channels.push(Arc::downgrade(&endpoint));
                slot.pending_channels.push(Arc::clone(&endpoint));
            }
            Ok(DataChannelHandle {
                channel: Arc::new(MemoryChannel(endpoint)),
                events: rx,
            })
        })
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.with_slot(|network, id| {
            let slot = network
                .peers
                .get_mut(&id)
                .ok_or_else(|| Error::Internal("missing slot".into()))?;
            if slot.signaling != SignalingState::Stable || slot.remote_peer.is_some() {
                return Err(Error::Negotiation(format!(
                    "cannot create offer in state {:?}",
                    slot.signaling
                )));
            }
            slot.signaling = SignalingState::HaveLocalOffer;
            let offer = SessionDescription::offer(describe(id));
            Self::set_local(network, id, &offer);
            Ok(offer)
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.with_slot(|network, id| {
            let slot = network
                .peers
                .get_mut(&id)
                .ok_or_else(|| Error::Internal("missing slot".into()))?;
            if slot.signaling != SignalingState::HaveRemoteOffer {
                return Err(Error::Negotiation(format!(
                    "cannot create answer in state {:?}",
                    slot.signaling
                )));
            }
            slot.signaling = SignalingState::Stable;
            let answer = SessionDescription::answer(describe(id));
            Self::set_local(network, id, &answer);
            try_connect(network, id);
            Ok(answer)
        })
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let remote = peer_id(&description)?;
        self.with_slot(|network, id| {
            if !network.peers.contains_key(&remote) || remote == id {
                return Err(Error::Negotiation(format!("unknown memory peer {remote}")));
            }
            let slot = network
                .peers
                .get_mut(&id)
                .ok_or_else(|| Error::Internal("missing slot".into()))?;

            let next = match (slot.signaling, description.kind) {
                (SignalingState::Stable, SdpKind::Offer) if slot.local.is_none() => {
                    SignalingState::HaveRemoteOffer
                }
                (SignalingState::HaveLocalOffer, SdpKind::Answer) => SignalingState::Stable,
                (state, kind) => {
                    return Err(Error::Negotiation(format!(
                        "cannot apply remote {kind:?} in state {state:?}"
                    )))
                }
            };
            slot.signaling = next;
            slot.remote_peer = Some(remote);
            try_connect(network, id);
            Ok(())
        })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.with_slot(|network, id| {
            let slot = network
                .peers
                .get_mut(&id)
                .ok_or_else(|| Error::Internal("missing slot".into()))?;
            if slot.remote_peer.is_none() {
                return Err(Error::Negotiation(
                    "remote description not set before adding candidate".into(),
                ));
            }
            tracing::trace!("Memory transport {} added {}", id, candidate.candidate);
            slot.remote_candidates += 1;
            try_connect(network, id);
            Ok(())
        })
    }

    fn signaling_state(&self) -> SignalingState {
        self.shared
            .lock()
            .ok()
            .and_then(|n| n.peers.get(&self.id).map(|s| s.signaling))
            .unwrap_or(SignalingState::Closed)
    }

    async fn close(&self) -> Result<()> {
        let channels = {
            let mut network = lock(&self.shared)?;
            let Some(slot) = network.peers.remove(&self.id) else {
                return Ok(());
            };
            slot.emit(TransportEvent::StateChanged(PeerState::Closed));
            slot.channels
        };

        for endpoint in channels.iter().filter_map(Weak::upgrade) {
            endpoint.close();
        }
        Ok(())
    }
}

/// Shared state of one channel end.
struct Endpoint {
    label: String,
    open: AtomicBool,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<ChannelEvent>,
    peer: Mutex<Weak<Endpoint>>,
}

impl Endpoint {
    fn new(label: String, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            label,
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events,
            peer: Mutex::new(Weak::new()),
        }
    }

    fn link(self: &Arc<Self>, other: &Arc<Self>) {
        if let Ok(mut peer) = self.peer.lock() {
            *peer = Arc::downgrade(other);
        }
        if let Ok(mut peer) = other.peer.lock() {
            *peer = Arc::downgrade(self);
        }
    }

    fn peer(&self) -> Option<Arc<Self>> {
        self.peer.lock().ok().and_then(|p| p.upgrade())
    }

    fn open(&self) {
        if !self.closed.load(Ordering::SeqCst) && !self.open.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(ChannelEvent::Open);
        }
    }

    /// Close this end and its peer. Emits `Closed` once, even if never opened.
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            let _ = self.events.send(ChannelEvent::Closed);
            if let Some(peer) = self.peer() {
                peer.close();
            }
        }
    }
}

struct MemoryChannel(Arc<Endpoint>);

#[async_trait]
impl DataChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.0.label
    }

    fn is_open(&self) -> bool {
        self.0.open.load(Ordering::SeqCst)
    }

    async fn send(&self, message: ChannelMessage) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Transport("data channel is not open".into()));
        }
        let peer = self
            .0
            .peer()
            .ok_or_else(|| Error::Transport("remote data channel is gone".into()))?;
        peer.events
            .send(ChannelEvent::Message(message))
            .map_err(|_| Error::Transport("remote data channel is gone".into()))
    }

    async fn buffered_amount(&self) -> usize {
        0
    }

    async fn set_buffered_amount_low_threshold(&self, _threshold: usize) {}

    async fn close(&self) -> Result<()> {
        self.0.close();
        Ok(())
    }
}
