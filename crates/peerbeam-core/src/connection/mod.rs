//! Per-attempt connection state machine.
//!
//! A [`PeerLink`] owns exactly one connection attempt: one transport, one
//! data channel, one session code. It is never reused; a new transfer needs
//! a new link (and a new code).
//!
//! ## Phases
//!
//! ```text
//! Idle -> Initializing -> WaitingPeer -> Connected -> Transferring -> Completed
//!              \               \             \
//!               +---------------+-------------+--> Error
//! ```
//!
//! ## Sender
//!
//! 1. Create the transport and the `file-transfer` data channel
//! 2. Create the offer and publish it with `create_session`, obtaining the code
//! 3. Flush local candidates gathered before the code existed, in order
//! 4. Poll for the answer until it is applied, and poll the receiver's
//!    candidates until connected
//!
//! ## Receiver
//!
//! 1. Fetch the offer for the code; an unknown code ends the attempt before
//!    any transport exists
//! 2. Create the transport, apply the offer, publish the answer
//! 3. Poll the sender's candidates until connected
//!
//! Every asynchronous result re-checks that the attempt is still live under
//! the attempt lock before touching state, so nothing changes once
//! [`PeerLink::stop`] has returned.

pub mod negotiation;
pub mod poller;

pub use negotiation::{Negotiation, NegotiationState, RemoteCandidateQueue, Step};
pub use poller::RepeatingTask;

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, MutexGuard, Notify};
use tokio_util::sync::CancellationToken;

use crate::code::SessionCode;
use crate::error::{Error, Result};
use crate::signaling::{IceOrigin, Signaling};
use crate::status::{Phase, Status, StatusReporter};
use crate::transport::{
    DataChannelHandle, IceCandidate, PeerState, PeerTransport, SessionDescription, TransportEvent,
    TransportFactory,
};

/// Which side of the transfer this peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the offer and sends the file
    Sender,
    /// Answers with a code and receives the file
    Receiver,
}

impl Role {
    /// Candidate list this peer appends to.
    #[must_use]
    pub const fn local_origin(self) -> IceOrigin {
        match self {
            Self::Sender => IceOrigin::Offer,
            Self::Receiver => IceOrigin::Answer,
        }
    }

    /// Candidate list this peer polls.
    #[must_use]
    pub const fn remote_origin(self) -> IceOrigin {
        self.local_origin().opposite()
    }
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Interval of the answer and candidate polls
    pub poll_interval: Duration,
    /// Label of the data channel the sender creates
    pub channel_label: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            channel_label: crate::DATA_CHANNEL_LABEL.to_string(),
        }
    }
}

/// Mutable state of the attempt, guarded by one lock.
struct Attempt {
    live: bool,
    started: bool,
    role: Option<Role>,
    transport: Option<Arc<dyn PeerTransport>>,
    code: Option<SessionCode>,
    /// Local candidates gathered before a code exists
    ice_buffer: Vec<IceCandidate>,
    /// Ordered queue to the candidate poster, once a code exists
    outbox: Option<mpsc::UnboundedSender<IceCandidate>>,
    negotiation: Negotiation,
    remote_candidates: RemoteCandidateQueue,
    last_index: usize,
    peer_state: PeerState,
    channel: Option<DataChannelHandle>,
    channel_taken: bool,
    polls: Vec<RepeatingTask>,
    failure: Option<Error>,
}

/// Resources detached from the attempt at teardown.
struct Released {
    transport: Option<Arc<dyn PeerTransport>>,
    channel: Option<DataChannelHandle>,
    polls: Vec<RepeatingTask>,
}

impl Attempt {
    fn new() -> Self {
        Self {
            live: true,
            started: false,
            role: None,
            transport: None,
            code: None,
            ice_buffer: Vec::new(),
            outbox: None,
            negotiation: Negotiation::new(),
            remote_candidates: RemoteCandidateQueue::new(),
            last_index: 0,
            peer_state: PeerState::New,
            channel: None,
            channel_taken: false,
            polls: Vec::new(),
            failure: None,
        }
    }

    fn teardown(&mut self) -> Released {
        self.live = false;
        self.code = None;
        self.ice_buffer.clear();
        self.outbox = None;
        self.negotiation.close();
        self.remote_candidates.clear();
        self.last_index = 0;
        Released {
            transport: self.transport.take(),
            channel: self.channel.take(),
            polls: std::mem::take(&mut self.polls),
        }
    }

    fn transport(&self) -> Result<Arc<dyn PeerTransport>> {
        self.transport
            .clone()
            .ok_or_else(|| Error::Internal("transport not created".into()))
    }
}

struct Shared {
    id: String,
    config: LinkConfig,
    signaling: Arc<dyn Signaling>,
    factory: Arc<dyn TransportFactory>,
    reporter: StatusReporter,
    attempt: Mutex<Attempt>,
    changed: Notify,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One connection attempt.
///
/// Cloning the link yields another handle to the same attempt, so one task
/// can call [`stop`](Self::stop) while another is still inside
/// [`start_sender`](Self::start_sender).
#[derive(Clone)]
pub struct PeerLink {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.shared.id)
            .field("phase", &self.shared.reporter.current().phase)
            .finish_non_exhaustive()
    }
}

impl PeerLink {
    /// Create an idle attempt.
    pub fn new(
        signaling: Arc<dyn Signaling>,
        factory: Arc<dyn TransportFactory>,
        config: LinkConfig,
    ) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            shared: Arc::new(Shared {
                id,
                config,
                signaling,
                factory,
                reporter: StatusReporter::new(),
                attempt: Mutex::new(Attempt::new()),
                changed: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start as the sender. Returns the session code to share.
    ///
    /// # Errors
    ///
    /// Any failure is also reported on the status stream and ends the attempt.
    /// Starting a link twice is rejected without touching the running attempt.
    pub async fn start_sender(&self) -> Result<SessionCode> {
        self.shared.begin(Role::Sender).await?;
        let result = self.shared.run_sender().await;
        if let Err(e) = &result {
            self.shared.fail(e).await;
        }
        result
    }

    /// Start as the receiver for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] without creating a transport when
    /// the code is unknown or expired. Any failure is also reported on the
    /// status stream and ends the attempt.
    pub async fn start_receiver(&self, code: &SessionCode) -> Result<()> {
        self.shared.begin(Role::Receiver).await?;
        let result = self.shared.run_receiver(code).await;
        if let Err(e) = &result {
            self.shared.fail(e).await;
        }
        result
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<Status> {
        self.shared.reporter.subscribe()
    }

    /// The status reporter of this attempt.
    #[must_use]
    pub fn reporter(&self) -> &StatusReporter {
        &self.shared.reporter
    }

    /// Session code, once assigned.
    #[must_use]
    pub fn code(&self) -> Option<SessionCode> {
        self.shared.reporter.current().code
    }

    /// Wait for the data channel and take ownership of it.
    ///
    /// The sender's channel exists right after start; the receiver's arrives
    /// once the peer connection is up. The channel may not be open yet.
    ///
    /// # Errors
    ///
    /// Returns the attempt's failure, or [`Error::Cancelled`] after `stop()`.
    pub async fn take_channel(&self) -> Result<DataChannelHandle> {
        loop {
            let notified = self.shared.changed.notified();
            {
                let mut attempt = self.shared.attempt.lock().await;
                if let Some(handle) = attempt.channel.take() {
                    attempt.channel_taken = true;
                    return Ok(handle);
                }
                if !attempt.live {
                    return Err(attempt.failure.clone().unwrap_or(Error::Cancelled));
                }
            }
            notified.await;
        }
    }

    /// The error that ended the attempt, if it failed.
    pub async fn failure(&self) -> Option<Error> {
        self.shared.attempt.lock().await.failure.clone()
    }

    /// Report `err` and end the attempt.
    pub async fn fail(&self, err: &Error) {
        self.shared.fail(err).await;
    }

    /// Stop the attempt from any state.
    ///
    /// Cancels every poll, closes the channel and transport, and clears all
    /// buffers. Calling it again is a no-op.
    pub async fn stop(&self) {
        let released = {
            let mut attempt = self.shared.attempt.lock().await;
            if !attempt.live {
                return;
            }
            tracing::info!("[{}] Stopping attempt", self.shared.id);
            attempt.teardown()
        };
        self.shared.release(released);
    }
}

impl Shared {
    /// Lock the attempt, failing with [`Error::Cancelled`] once it ended.
    async fn lock_live(&self) -> Result<MutexGuard<'_, Attempt>> {
        let attempt = self.attempt.lock().await;
        if attempt.live {
            Ok(attempt)
        } else {
            Err(Error::Cancelled)
        }
    }

    async fn begin(&self, role: Role) -> Result<()> {
        let mut attempt = self.lock_live().await?;
        if attempt.started {
            return Err(Error::Internal("a link runs a single attempt".into()));
        }
        attempt.started = true;
        attempt.role = Some(role);
        self.reporter.set_phase(Phase::Initializing);
        tracing::info!("[{}] Starting as {:?}", self.id, role);
        Ok(())
    }

    async fn run_sender(self: &Arc<Self>) -> Result<SessionCode> {
        let (transport, events) = self.factory.create().await?;
        let handle = transport
            .create_data_channel(&self.config.channel_label)
            .await?;
        self.install(Arc::clone(&transport), events, Some(handle), None)
            .await?;

        let offer = {
            let mut attempt = self.lock_live().await?;
            let offer = transport.create_offer().await?;
            attempt.negotiation.local_offer()?;
            offer
        };

        let code = self.signaling.create_session(&offer).await?;
        tracing::info!("[{}] Session {} created", self.id, code);

        {
            let mut attempt = self.lock_live().await?;
            self.open_outbox(&mut attempt, code.clone());
            if attempt.peer_state != PeerState::Connected {
                self.reporter.set_phase(Phase::WaitingPeer);
            }
        }

        self.start_polls(Role::Sender).await?;
        Ok(code)
    }

    async fn run_receiver(self: &Arc<Self>, code: &SessionCode) -> Result<()> {
        self.reporter.set_code(code);

        let offer = self.signaling.get_session(code).await?;

        let (transport, events) = self.factory.create().await?;
        self.install(Arc::clone(&transport), events, None, Some(code.clone()))
            .await?;

        let answer = {
            let mut attempt = self.lock_live().await?;
            attempt.negotiation.remote_offer()?;
            transport.set_remote_description(offer).await?;
            for candidate in attempt.remote_candidates.mark_ready() {
                self.add_remote(&transport, candidate).await;
            }
            let answer = transport.create_answer().await?;
            attempt.negotiation.local_answer()?;
            answer
        };

        self.signaling.post_answer(code, &answer).await?;
        tracing::info!("[{}] Answer posted for session {}", self.id, code);

        {
            let attempt = self.lock_live().await?;
            if attempt.peer_state != PeerState::Connected {
                self.reporter.set_phase(Phase::WaitingPeer);
            }
        }

        self.start_polls(Role::Receiver).await
    }

    /// Attach the transport to the attempt and start pumping its events.
    async fn install(
        self: &Arc<Self>,
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        channel: Option<DataChannelHandle>,
        code: Option<SessionCode>,
    ) -> Result<()> {
        let mut attempt = self.attempt.lock().await;
        if !attempt.live {
            tokio::spawn(async move {
                let _ = transport.close().await;
            });
            return Err(Error::Cancelled);
        }

        attempt.transport = Some(transport);
        attempt.channel = channel;
        if let Some(code) = code {
            self.open_outbox(&mut attempt, code);
        }
        self.spawn_event_pump(events);
        Ok(())
    }

    /// Record the code and hand every buffered local candidate, then every
    /// later one, to a single poster task in discovery order.
    fn open_outbox(self: &Arc<Self>, attempt: &mut Attempt, code: SessionCode) {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = std::mem::take(&mut attempt.ice_buffer);
        if !buffered.is_empty() {
            tracing::debug!(
                "[{}] Flushing {} buffered local candidates",
                self.id,
                buffered.len()
            );
        }
        for candidate in buffered {
            let _ = tx.send(candidate);
        }

        attempt.code = Some(code.clone());
        attempt.outbox = Some(tx);
        self.reporter.set_code(&code);

        let origin = attempt
            .role
            .map_or(IceOrigin::Offer, Role::local_origin);
        tokio::spawn(post_candidates(Arc::downgrade(self), code, origin, rx));
    }

    fn spawn_event_pump(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let weak = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let id = self.id.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.on_event(event).await;
            }
            tracing::trace!("[{}] Event pump stopped", id);
        });
    }

    async fn start_polls(self: &Arc<Self>, role: Role) -> Result<()> {
        let mut attempt = self.lock_live().await?;
        if matches!(attempt.peer_state, PeerState::Connected | PeerState::Closed) {
            return Ok(());
        }

        let interval = self.config.poll_interval;
        if role == Role::Sender {
            let weak = Arc::downgrade(self);
            attempt.polls.push(RepeatingTask::spawn(interval, move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(shared) => shared.poll_answer().await,
                        None => ControlFlow::Break(()),
                    }
                }
            }));
        }

        let weak = Arc::downgrade(self);
        attempt.polls.push(RepeatingTask::spawn(interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(shared) => shared.poll_candidates().await,
                    None => ControlFlow::Break(()),
                }
            }
        }));
        Ok(())
    }

    async fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => self.queue_local_candidate(candidate).await,
            TransportEvent::StateChanged(state) => self.on_peer_state(state).await,
            TransportEvent::DataChannel(handle) => {
                let mut attempt = self.attempt.lock().await;
                if !attempt.live
                    || attempt.role != Some(Role::Receiver)
                    || attempt.channel_taken
                    || attempt.channel.is_some()
                {
                    return;
                }
                tracing::debug!("[{}] Data channel '{}' arrived", self.id, handle.channel.label());
                attempt.channel = Some(handle);
                drop(attempt);
                self.changed.notify_waiters();
            }
        }
    }

    async fn queue_local_candidate(&self, candidate: IceCandidate) {
        let mut attempt = self.attempt.lock().await;
        if !attempt.live {
            return;
        }
        if attempt.code.is_none() {
            tracing::debug!("[{}] Buffering local candidate until a code exists", self.id);
            attempt.ice_buffer.push(candidate);
        } else if let Some(outbox) = &attempt.outbox {
            let _ = outbox.send(candidate);
        } else {
            tracing::trace!("[{}] Dropping local candidate after connect", self.id);
        }
    }

    async fn on_peer_state(&self, state: PeerState) {
        match state {
            PeerState::Connected => {
                let (code, polls) = {
                    let mut attempt = self.attempt.lock().await;
                    if !attempt.live || attempt.peer_state == PeerState::Connected {
                        return;
                    }
                    attempt.peer_state = PeerState::Connected;
                    attempt.outbox = None;
                    self.reporter.set_phase(Phase::Connected);
                    (attempt.code.clone(), std::mem::take(&mut attempt.polls))
                };
                for poll in &polls {
                    poll.cancel();
                }
                tracing::info!("[{}] Peer connected", self.id);
                self.changed.notify_waiters();

                if let Some(code) = code {
                    let signaling = Arc::clone(&self.signaling);
                    tokio::spawn(async move {
                        if let Err(e) = signaling.delete_session(&code).await {
                            tracing::warn!("Failed to delete session {}: {}", code, e);
                        }
                    });
                }
            }
            PeerState::Failed => {
                self.fail(&Error::Transport("peer connection failed".into()))
                    .await;
            }
            PeerState::Closed => {
                let polls = {
                    let mut attempt = self.attempt.lock().await;
                    if !attempt.live {
                        return;
                    }
                    attempt.peer_state = PeerState::Closed;
                    std::mem::take(&mut attempt.polls)
                };
                for poll in &polls {
                    poll.cancel();
                }
            }
            PeerState::Disconnected => {
                tracing::warn!("[{}] Peer connection disconnected", self.id);
            }
            PeerState::New | PeerState::Connecting => {
                let mut attempt = self.attempt.lock().await;
                if attempt.live {
                    attempt.peer_state = state;
                }
            }
        }
    }

    /// One tick of the answer poll.
    async fn poll_answer(&self) -> ControlFlow<()> {
        let code = {
            let attempt = self.attempt.lock().await;
            match (&attempt.code, attempt.live) {
                (Some(code), true) => code.clone(),
                _ => return ControlFlow::Break(()),
            }
        };

        let answer = match self.signaling.get_answer(&code).await {
            Ok(Some(answer)) => answer,
            Ok(None) => return ControlFlow::Continue(()),
            Err(e) => {
                self.fail(&e).await;
                return ControlFlow::Break(());
            }
        };

        if let Err(e) = self.apply_answer(answer).await {
            self.fail(&e).await;
        }
        ControlFlow::Break(())
    }

    /// Apply the remote answer through the negotiation guard.
    async fn apply_answer(&self, answer: SessionDescription) -> Result<()> {
        let mut attempt = self.attempt.lock().await;
        if !attempt.live {
            return Ok(());
        }
        let transport = attempt.transport()?;

        match attempt.negotiation.remote_answer(transport.signaling_state())? {
            Step::Apply => {
                transport.set_remote_description(answer).await?;
                tracing::info!("[{}] Remote answer applied", self.id);
            }
            Step::Skip => {
                tracing::debug!("[{}] Answer already applied, skipping", self.id);
            }
        }
        attempt.negotiation.answer_applied();

        let held = attempt.remote_candidates.mark_ready();
        if !held.is_empty() {
            tracing::debug!("[{}] Applying {} held remote candidates", self.id, held.len());
        }
        for candidate in held {
            self.add_remote(&transport, candidate).await;
        }
        Ok(())
    }

    /// One tick of the remote candidate poll.
    async fn poll_candidates(&self) -> ControlFlow<()> {
        let (code, since, origin) = {
            let attempt = self.attempt.lock().await;
            match (&attempt.code, attempt.role, attempt.live) {
                (Some(code), Some(role), true) => {
                    (code.clone(), attempt.last_index, role.remote_origin())
                }
                _ => return ControlFlow::Break(()),
            }
        };

        let batch = match self.signaling.get_ice(&code, origin, since).await {
            Ok(batch) => batch,
            Err(e) => {
                self.fail(&e).await;
                return ControlFlow::Break(());
            }
        };

        let mut attempt = self.attempt.lock().await;
        if !attempt.live {
            return ControlFlow::Break(());
        }
        if batch.total >= since {
            attempt.last_index = batch.total;
        }
        if batch.candidates.is_empty() {
            return ControlFlow::Continue(());
        }

        tracing::debug!(
            "[{}] Received {} remote candidates (total {})",
            self.id,
            batch.candidates.len(),
            batch.total
        );
        let Ok(transport) = attempt.transport() else {
            return ControlFlow::Break(());
        };
        for candidate in batch.candidates {
            if let Some(candidate) = attempt.remote_candidates.push(candidate) {
                self.add_remote(&transport, candidate).await;
            }
        }
        ControlFlow::Continue(())
    }

    async fn add_remote(&self, transport: &Arc<dyn PeerTransport>, candidate: IceCandidate) {
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            tracing::warn!("[{}] Remote candidate rejected: {}", self.id, e);
        }
    }

    async fn fail(&self, err: &Error) {
        let released = {
            let mut attempt = self.attempt.lock().await;
            if !attempt.live {
                tracing::debug!("[{}] Ignoring error after teardown: {}", self.id, err);
                return;
            }
            self.reporter.fail(err);
            attempt.failure = Some(err.clone());
            attempt.teardown()
        };
        self.release(released);
    }

    fn release(&self, released: Released) {
        self.shutdown.cancel();
        for poll in &released.polls {
            poll.cancel();
        }
        self.changed.notify_waiters();

        let Released {
            transport, channel, ..
        } = released;
        if transport.is_none() && channel.is_none() {
            return;
        }
        let id = self.id.clone();
        tokio::spawn(async move {
            if let Some(handle) = channel {
                let _ = handle.channel.close().await;
            }
            if let Some(transport) = transport {
                if let Err(e) = transport.close().await {
                    tracing::debug!("[{}] Transport close failed: {}", id, e);
                }
            }
        });
    }
}

/// Post local candidates one at a time, in queue order.
async fn post_candidates(
    shared: Weak<Shared>,
    code: SessionCode,
    origin: IceOrigin,
    mut rx: mpsc::UnboundedReceiver<IceCandidate>,
) {
    let Some(token) = shared.upgrade().map(|s| s.shutdown.clone()) else {
        return;
    };

    loop {
        let candidate = tokio::select! {
            biased;
            () = token.cancelled() => break,
            candidate = rx.recv() => match candidate {
                Some(candidate) => candidate,
                None => break,
            },
        };
        let Some(link) = shared.upgrade() else {
            break;
        };

        match link.signaling.post_ice(&code, &candidate, origin).await {
            Ok(()) => tracing::debug!("[{}] Posted local candidate", link.id),
            Err(Error::SessionNotFound(_)) => {
                tracing::warn!(
                    "[{}] Session {} is gone, no longer posting candidates",
                    link.id,
                    code
                );
                break;
            }
            Err(e) => {
                link.fail(&e).await;
                break;
            }
        }
    }
}
