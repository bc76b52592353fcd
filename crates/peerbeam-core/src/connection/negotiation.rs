//! Offer/answer negotiation state and remote candidate buffering.
//!
//! [`Negotiation`] tracks where the local side is in the offer/answer
//! exchange. Remote descriptions go through a guarded transition that
//! returns [`Step::Skip`] when the exchange is already complete, so a
//! duplicate or late answer is harmless instead of a negotiation error.

use crate::error::{Error, Result};
use crate::transport::{IceCandidate, SignalingState};

/// Local view of the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing applied yet
    New,
    /// Local offer applied (sender)
    LocalOffer,
    /// Remote offer applied (receiver)
    RemoteOffer,
    /// Both descriptions applied
    Stable,
    /// Attempt torn down
    Closed,
}

/// Outcome of a guarded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Apply the description to the transport
    Apply,
    /// Already negotiated; leave the transport alone
    Skip,
}

/// Negotiation state machine for one attempt.
#[derive(Debug)]
pub struct Negotiation {
    state: NegotiationState,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiation {
    /// Start in [`NegotiationState::New`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: NegotiationState::New,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> NegotiationState {
        self.state
    }

    /// Whether the remote description has been applied.
    #[must_use]
    pub const fn has_remote(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::RemoteOffer | NegotiationState::Stable
        )
    }

    /// Record the local offer.
    pub fn local_offer(&mut self) -> Result<()> {
        self.transition(NegotiationState::New, NegotiationState::LocalOffer, "local offer")
    }

    /// Record the remote offer.
    pub fn remote_offer(&mut self) -> Result<()> {
        self.transition(NegotiationState::New, NegotiationState::RemoteOffer, "remote offer")
    }

    /// Record the local answer.
    pub fn local_answer(&mut self) -> Result<()> {
        self.transition(
            NegotiationState::RemoteOffer,
            NegotiationState::Stable,
            "local answer",
        )
    }

    /// Decide whether a remote answer should be applied.
    ///
    /// `observed` is the transport's own signaling state; if either side
    /// already considers the exchange complete the answer is skipped.
    pub fn remote_answer(&self, observed: SignalingState) -> Result<Step> {
        match (self.state, observed) {
            (NegotiationState::Stable, _) | (NegotiationState::LocalOffer, SignalingState::Stable) => {
                Ok(Step::Skip)
            }
            (NegotiationState::LocalOffer, SignalingState::HaveLocalOffer) => Ok(Step::Apply),
            (state, observed) => Err(Error::Negotiation(format!(
                "cannot apply answer in state {state:?} (transport {observed:?})"
            ))),
        }
    }

    /// Record that the remote answer was applied or found already applied.
    pub fn answer_applied(&mut self) {
        if self.state == NegotiationState::LocalOffer {
            self.state = NegotiationState::Stable;
        }
    }

    /// Close the state machine; every later transition fails.
    pub fn close(&mut self) {
        self.state = NegotiationState::Closed;
    }

    fn transition(
        &mut self,
        from: NegotiationState,
        to: NegotiationState,
        what: &str,
    ) -> Result<()> {
        if self.state != from {
            return Err(Error::Negotiation(format!(
                "unexpected {what} in state {:?}",
                self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

/// Remote candidates held back until the remote description is applied.
#[derive(Debug, Default)]
pub struct RemoteCandidateQueue {
    pending: Vec<IceCandidate>,
    ready: bool,
}

impl RemoteCandidateQueue {
    /// Create an empty, not-ready queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. Returns it back when it can be applied now.
    pub fn push(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.ready {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Mark the remote description applied and take everything held back,
    /// in arrival order.
    pub fn mark_ready(&mut self) -> Vec<IceCandidate> {
        self.ready = true;
        std::mem::take(&mut self.pending)
    }

    /// Number of held-back candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is held back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything and go back to not ready.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.ready = false;
    }
}
