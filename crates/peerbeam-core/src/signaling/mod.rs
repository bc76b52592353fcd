//! Rendezvous client API.
//!
//! The connection manager reaches the rendezvous store only through the
//! [`Signaling`] trait. Two implementations ship with the crate:
//!
//! - [`HttpSignalingClient`]: talks to a rendezvous server over HTTP
//! - [`LocalSignaling`]: calls an in-process [`SessionStore`] directly
//!
//! [`SessionStore`]: crate::rendezvous::SessionStore

mod http;
mod local;
pub mod messages;

pub use http::HttpSignalingClient;
pub use local::LocalSignaling;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::code::SessionCode;
use crate::error::Result;
use crate::transport::{IceCandidate, SessionDescription};

/// Which peer produced a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceOrigin {
    /// Candidates of the offering peer (sender)
    Offer,
    /// Candidates of the answering peer (receiver)
    Answer,
}

impl IceOrigin {
    /// Wire name of this origin.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
        }
    }

    /// The other peer's origin.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Offer => Self::Answer,
            Self::Answer => Self::Offer,
        }
    }
}

/// A suffix of one candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceBatch {
    /// Entries from the requested index on
    pub candidates: Vec<IceCandidate>,
    /// Full length of the list
    pub total: usize,
}

/// Operations of the rendezvous store, as seen by a peer.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Store an offer and return a fresh session code.
    async fn create_session(&self, offer: &SessionDescription) -> Result<SessionCode>;

    /// Fetch the offer for `code`.
    ///
    /// Fails with [`crate::Error::SessionNotFound`] for unknown or expired codes.
    async fn get_session(&self, code: &SessionCode) -> Result<SessionDescription>;

    /// Publish the answer for `code`.
    async fn post_answer(&self, code: &SessionCode, answer: &SessionDescription) -> Result<()>;

    /// Fetch the answer, `None` while it has not been posted.
    async fn get_answer(&self, code: &SessionCode) -> Result<Option<SessionDescription>>;

    /// Append a candidate to the `origin` list.
    async fn post_ice(
        &self,
        code: &SessionCode,
        candidate: &IceCandidate,
        origin: IceOrigin,
    ) -> Result<()>;

    /// Read the `origin` list from index `since`.
    async fn get_ice(&self, code: &SessionCode, origin: IceOrigin, since: usize)
        -> Result<IceBatch>;

    /// Remove the session. Succeeds when it is already gone.
    async fn delete_session(&self, code: &SessionCode) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_names() {
        assert_eq!(IceOrigin::Offer.as_str(), "offer");
        assert_eq!(IceOrigin::Answer.opposite(), IceOrigin::Offer);
        assert_eq!(
            serde_json::to_string(&IceOrigin::Answer).unwrap(),
            "\"answer\""
        );
    }
}
