//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::code::{CodeSource, SessionCode};
use crate::error::{Error, Result};
use crate::signaling::{IceBatch, IceOrigin, LocalSignaling, Signaling};
use crate::transport::{
    ChannelEvent, ChannelMessage, DataChannel, DataChannelHandle, IceCandidate, PeerTransport,
    SdpKind, SessionDescription, SignalingState, TransportEvent, TransportFactory,
};

/// Hands out a fixed sequence of codes, then `000000` forever.
pub struct ScriptedCodes(VecDeque<u32>);

impl ScriptedCodes {
    pub fn new(codes: &[u32]) -> Self {
        Self(codes.iter().copied().collect())
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&mut self) -> SessionCode {
        SessionCode::from_number(self.0.pop_front().unwrap_or_default())
    }
}

/// An open/closed barrier async calls can wait on.
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn new(open: bool) -> Self {
        Self(watch::channel(open).0)
    }

    pub fn open(&self) {
        self.0.send_replace(true);
    }

    pub fn close(&self) {
        self.0.send_replace(false);
    }

    pub async fn wait(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// In-process signaling with gates and call counters.
pub struct MockSignaling {
    inner: LocalSignaling,
    pub create_gate: Gate,
    pub answer_gate: Gate,
    posted: Mutex<Vec<(IceOrigin, IceCandidate)>>,
    get_answer_calls: AtomicUsize,
    get_ice_calls: AtomicUsize,
    deletes: AtomicUsize,
}

impl MockSignaling {
    pub fn new() -> Self {
        Self {
            inner: LocalSignaling::default(),
            create_gate: Gate::new(true),
            answer_gate: Gate::new(true),
            posted: Mutex::new(Vec::new()),
            get_answer_calls: AtomicUsize::new(0),
            get_ice_calls: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &LocalSignaling {
        &self.inner
    }

    pub fn posted(&self) -> Vec<(IceOrigin, IceCandidate)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn get_answer_calls(&self) -> usize {
        self.get_answer_calls.load(Ordering::SeqCst)
    }

    pub fn get_ice_calls(&self) -> usize {
        self.get_ice_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signaling for MockSignaling {
    async fn create_session(&self, offer: &SessionDescription) -> Result<SessionCode> {
        self.create_gate.wait().await;
        self.inner.create_session(offer).await
    }

    async fn get_session(&self, code: &SessionCode) -> Result<SessionDescription> {
        self.inner.get_session(code).await
    }

    async fn post_answer(&self, code: &SessionCode, answer: &SessionDescription) -> Result<()> {
        self.inner.post_answer(code, answer).await
    }

    async fn get_answer(&self, code: &SessionCode) -> Result<Option<SessionDescription>> {
        self.get_answer_calls.fetch_add(1, Ordering::SeqCst);
        self.answer_gate.wait().await;
        self.inner.get_answer(code).await
    }

    async fn post_ice(
        &self,
        code: &SessionCode,
        candidate: &IceCandidate,
        origin: IceOrigin,
    ) -> Result<()> {
        self.inner.post_ice(code, candidate, origin).await?;
        self.posted.lock().unwrap().push((origin, candidate.clone()));
        Ok(())
    }

    async fn get_ice(
        &self,
        code: &SessionCode,
        origin: IceOrigin,
        since: usize,
    ) -> Result<IceBatch> {
        self.get_ice_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_ice(code, origin, since).await
    }

    async fn delete_session(&self, code: &SessionCode) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_session(code).await
    }
}

/// Factory keeping every transport it created.
#[derive(Default)]
pub struct MockFactory {
    transports: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.transports.lock().unwrap()[index])
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            events: tx,
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(SignalingState::Stable),
            has_remote: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
        });
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        Ok((transport as Arc<dyn PeerTransport>, rx))
    }
}

/// Transport that records calls and lets the test inject events.
pub struct MockTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    calls: Mutex<Vec<String>>,
    state: Mutex<SignalingState>,
    has_remote: AtomicBool,
    closed: AtomicBool,
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockTransport {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn set_signaling_state(&self, state: SignalingState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn channel(&self, index: usize) -> Arc<MockChannel> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_data_channel(&self, label: &str) -> Result<DataChannelHandle> {
        self.record("create_data_channel");
        let (channel, handle) = MockChannel::labelled(label, false);
        self.channels.lock().unwrap().push(channel);
        Ok(handle)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record("create_offer");
        *self.state.lock().unwrap() = SignalingState::HaveLocalOffer;
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock().unwrap();
        if *state != SignalingState::HaveRemoteOffer {
            return Err(Error::Negotiation(format!("no remote offer ({:?})", *state)));
        }
        *state = SignalingState::Stable;
        drop(state);
        self.record("create_answer");
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let next = match (*state, description.kind) {
            (SignalingState::Stable, SdpKind::Offer) => SignalingState::HaveRemoteOffer,
            (SignalingState::HaveLocalOffer, SdpKind::Answer) => SignalingState::Stable,
            (current, kind) => {
                return Err(Error::Negotiation(format!(
                    "remote {kind:?} in state {current:?}"
                )))
            }
        };
        *state = next;
        drop(state);
        self.has_remote.store(true, Ordering::SeqCst);
        self.record(match description.kind {
            SdpKind::Offer => "set_remote:offer",
            SdpKind::Answer => "set_remote:answer",
        });
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if !self.has_remote.load(Ordering::SeqCst) {
            return Err(Error::Negotiation("no remote description".into()));
        }
        self.record(format!("add_ice:{}", candidate.candidate));
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = SignalingState::Closed;
        self.record("close");
        Ok(())
    }
}

/// Data channel that records sends and lets the test inject events.
pub struct MockChannel {
    label: String,
    open: AtomicBool,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<ChannelEvent>,
    sent: Mutex<Vec<ChannelMessage>>,
    buffered: AtomicUsize,
    accumulate: AtomicBool,
    threshold: AtomicUsize,
    reply: Mutex<Option<(usize, ChannelMessage)>>,
}

impl MockChannel {
    /// A `file-transfer` channel and the handle the code under test uses.
    pub fn pair(open: bool) -> (Arc<Self>, DataChannelHandle) {
        Self::labelled(crate::DATA_CHANNEL_LABEL, open)
    }

    pub fn labelled(label: &str, open: bool) -> (Arc<Self>, DataChannelHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            label: label.to_string(),
            open: AtomicBool::new(open),
            closed: AtomicBool::new(false),
            events: tx,
            sent: Mutex::new(Vec::new()),
            buffered: AtomicUsize::new(0),
            accumulate: AtomicBool::new(false),
            threshold: AtomicUsize::new(0),
            reply: Mutex::new(None),
        });
        let handle = DataChannelHandle {
            channel: Arc::clone(&channel) as Arc<dyn DataChannel>,
            events: rx,
        };
        (channel, handle)
    }

    pub fn inject(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.inject(ChannelEvent::Open);
    }

    pub fn sent(&self) -> Vec<ChannelMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Deliver `message` once `sends` messages were sent.
    pub fn reply_after(&self, sends: usize, message: ChannelMessage) {
        *self.reply.lock().unwrap() = Some((sends, message));
    }

    /// Make every send add to the buffered amount until [`drain`](Self::drain).
    pub fn accumulate_buffered(&self, on: bool) {
        self.accumulate.store(on, Ordering::SeqCst);
    }

    pub fn drain(&self) {
        self.buffered.store(0, Ordering::SeqCst);
    }

    pub fn threshold(&self) -> usize {
        self.threshold.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, message: ChannelMessage) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Transport("mock channel is not open".into()));
        }
        if self.accumulate.load(Ordering::SeqCst) {
            self.buffered.fetch_add(message.len(), Ordering::SeqCst);
        }

        let count = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message);
            sent.len()
        };
        let reply = {
            let mut reply = self.reply.lock().unwrap();
            match reply.as_ref() {
                Some((after, _)) if *after == count => reply.take(),
                _ => None,
            }
        };
        if let Some((_, message)) = reply {
            self.inject(ChannelEvent::Message(message));
        }
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    async fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            self.inject(ChannelEvent::Closed);
        }
        Ok(())
    }
}
