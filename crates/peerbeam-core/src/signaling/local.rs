//! In-process signaling over a shared [`SessionStore`].

use std::sync::Arc;

use async_trait::async_trait;

use super::{IceBatch, IceOrigin, Signaling};
use crate::code::SessionCode;
use crate::error::Result;
use crate::rendezvous::SessionStore;
use crate::transport::{IceCandidate, SessionDescription};

/// Signaling client calling a [`SessionStore`] directly.
///
/// Peers in one process share the store by cloning this client.
#[derive(Debug, Clone, Default)]
pub struct LocalSignaling {
    store: Arc<SessionStore>,
}

impl LocalSignaling {
    /// Wrap an existing store.
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

#[async_trait]
impl Signaling for LocalSignaling {
    async fn create_session(&self, offer: &SessionDescription) -> Result<SessionCode> {
        self.store.create_session(offer.clone()).await
    }

    async fn get_session(&self, code: &SessionCode) -> Result<SessionDescription> {
        self.store.get_session(code).await
    }

    async fn post_answer(&self, code: &SessionCode, answer: &SessionDescription) -> Result<()> {
        self.store.post_answer(code, answer.clone()).await
    }

    async fn get_answer(&self, code: &SessionCode) -> Result<Option<SessionDescription>> {
        self.store.get_answer(code).await
    }

    async fn post_ice(
        &self,
        code: &SessionCode,
        candidate: &IceCandidate,
        origin: IceOrigin,
    ) -> Result<()> {
        self.store.post_ice(code, candidate.clone(), origin).await
    }

    async fn get_ice(
        &self,
        code: &SessionCode,
        origin: IceOrigin,
        since: usize,
    ) -> Result<IceBatch> {
        Ok(self.store.get_ice(code, origin, since).await)
    }

    async fn delete_session(&self, code: &SessionCode) -> Result<()> {
        self.store.delete_session(code).await;
        Ok(())
    }
}
