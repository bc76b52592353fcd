//! Rendezvous session store.
//!
//! The store keeps, per session code, the sender's offer, the receiver's
//! answer and one append-only candidate list per peer. Every session lives
//! for a fixed TTL from creation; reads never refresh it. Expired entries
//! are invisible to reads immediately and are purged by a periodic task.
//!
//! With the `server` feature, [`server`] exposes the store over HTTP.

#[cfg(feature = "server")]
pub mod error;
#[cfg(feature = "server")]
pub mod server;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::code::{CodeGenerator, CodeSource, SessionCode, MAX_CODE_ATTEMPTS};
use crate::error::{Error, Result};
use crate::signaling::{IceBatch, IceOrigin};
use crate::transport::{IceCandidate, SessionDescription};

/// Stored state of one session.
#[derive(Debug, Clone)]
struct SessionRecord {
    offer: SessionDescription,
    answer: Option<SessionDescription>,
    ice_offer: Vec<IceCandidate>,
    ice_answer: Vec<IceCandidate>,
    expires_at: Instant,
}

impl SessionRecord {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn candidates(&self, origin: IceOrigin) -> &Vec<IceCandidate> {
        match origin {
            IceOrigin::Offer => &self.ice_offer,
            IceOrigin::Answer => &self.ice_answer,
        }
    }

    fn candidates_mut(&mut self, origin: IceOrigin) -> &mut Vec<IceCandidate> {
        match origin {
            IceOrigin::Offer => &mut self.ice_offer,
            IceOrigin::Answer => &mut self.ice_answer,
        }
    }
}

/// In-memory rendezvous store with a fixed per-session TTL.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionCode, SessionRecord>>,
    codes: Mutex<Box<dyn CodeSource>>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionStore {
    /// Create a store issuing random codes.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_code_source(ttl, CodeGenerator::new())
    }

    /// Create a store drawing codes from `source`.
    pub fn with_code_source(ttl: Duration, source: impl CodeSource + 'static) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            codes: Mutex::new(Box::new(source)),
            ttl,
        }
    }

    /// Session lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn next_code(&self) -> Result<SessionCode> {
        let mut source = self
            .codes
            .lock()
            .map_err(|_| Error::Internal("code source lock poisoned".into()))?;
        Ok(source.next_code())
    }

    /// Store `offer` under a fresh code.
    ///
    /// Codes colliding with a live session are skipped; after
    /// [`MAX_CODE_ATTEMPTS`] collisions in a row this gives up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeCollision`] when no free code was found.
    pub async fn create_session(&self, offer: SessionDescription) -> Result<SessionCode> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = self.next_code()?;
            if sessions.get(&code).is_some_and(|s| s.is_live(now)) {
                tracing::debug!("Code {} in use (attempt {})", code, attempt);
                continue;
            }

            sessions.insert(
                code.clone(),
                SessionRecord {
                    offer,
                    answer: None,
                    ice_offer: Vec::new(),
                    ice_answer: Vec::new(),
                    expires_at: now + self.ttl,
                },
            );
            tracing::info!("Created session {}", code);
            return Ok(code);
        }

        Err(Error::CodeCollision(MAX_CODE_ATTEMPTS))
    }

    /// Offer stored under `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or expired codes.
    pub async fn get_session(&self, code: &SessionCode) -> Result<SessionDescription> {
        self.read_live(code, |s| s.offer.clone()).await
    }

    /// Store the answer for `code`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] when no offer exists for `code`.
    pub async fn post_answer(&self, code: &SessionCode, answer: SessionDescription) -> Result<()> {
        self.write_live(code, |s| s.answer = Some(answer)).await
    }

    /// Answer for `code`, `None` until posted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or expired codes.
    pub async fn get_answer(&self, code: &SessionCode) -> Result<Option<SessionDescription>> {
        self.read_live(code, |s| s.answer.clone()).await
    }

    /// Append `candidate` to the `origin` list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or expired codes.
    pub async fn post_ice(
        &self,
        code: &SessionCode,
        candidate: IceCandidate,
        origin: IceOrigin,
    ) -> Result<()> {
        self.write_live(code, |s| s.candidates_mut(origin).push(candidate))
            .await
    }

    /// Entries of the `origin` list from index `since`, plus its length.
    ///
    /// A missing session reads as an empty list.
    pub async fn get_ice(&self, code: &SessionCode, origin: IceOrigin, since: usize) -> IceBatch {
        self.read_live(code, |s| {
            let list = s.candidates(origin);
            IceBatch {
                candidates: list.get(since..).map(<[_]>::to_vec).unwrap_or_default(),
                total: list.len(),
            }
        })
        .await
        .unwrap_or_default()
    }

    /// Remove `code`. Removing an absent session is not an error.
    pub async fn delete_session(&self, code: &SessionCode) {
        if self.sessions.write().await.remove(code).is_some() {
            tracing::info!("Deleted session {}", code);
        }
    }

    /// Drop every expired session, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live(now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired sessions", removed);
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_live(now))
            .count()
    }

    /// Whether no live session exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Purge expired sessions every `interval` until the task is aborted.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(interval.max(crate::connection::poller::MIN_INTERVAL));
            loop {
                ticker.tick().await;
                store.purge_expired().await;
            }
        })
    }

    async fn read_live<T>(
        &self,
        code: &SessionCode,
        f: impl FnOnce(&SessionRecord) -> T,
    ) -> Result<T> {
        let sessions = self.sessions.read().await;
        sessions
            .get(code)
            .filter(|s| s.is_live(Instant::now()))
            .map(f)
            .ok_or_else(|| Error::SessionNotFound(code.to_string()))
    }

    async fn write_live(
        &self,
        code: &SessionCode,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(code) {
            Some(record) if record.is_live(now) => {
                f(record);
                Ok(())
            }
            _ => Err(Error::SessionNotFound(code.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCodes;

    fn offer() -> SessionDescription {
        SessionDescription::offer("v=0 offer")
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = SessionStore::default();
        let code = store.create_session(offer()).await.unwrap();

        assert_eq!(store.get_session(&code).await.unwrap(), offer());
        assert!(store.get_answer(&code).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_collision_yields_distinct_code() {
        let store =
            SessionStore::with_code_source(Duration::from_secs(60), ScriptedCodes::new(&[7, 7, 8]));

        let first = store.create_session(offer()).await.unwrap();
        let second = store.create_session(offer()).await.unwrap();

        assert_eq!(first.as_str(), "000007");
        assert_eq!(second.as_str(), "000008");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_collision_retry_is_bounded() {
        let store = SessionStore::with_code_source(
            Duration::from_secs(60),
            ScriptedCodes::new(&[5; MAX_CODE_ATTEMPTS + 1]),
        );

        store.create_session(offer()).await.unwrap();
        let err = store.create_session(offer()).await.unwrap_err();
        assert!(matches!(err, Error::CodeCollision(n) if n == MAX_CODE_ATTEMPTS));
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let store = SessionStore::default();
        let code = SessionCode::from_number(123_456);

        assert!(matches!(
            store.get_session(&code).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            store
                .post_answer(&code, SessionDescription::answer("a"))
                .await,
            Err(Error::SessionNotFound(_))
        ));
        assert_eq!(
            store.get_ice(&code, IceOrigin::Offer, 0).await,
            IceBatch::default()
        );
        store.delete_session(&code).await;
    }

    #[tokio::test]
    async fn test_answer_roundtrip() {
        let store = SessionStore::default();
        let code = store.create_session(offer()).await.unwrap();
        let answer = SessionDescription::answer("v=0 answer");

        store.post_answer(&code, answer.clone()).await.unwrap();
        assert_eq!(store.get_answer(&code).await.unwrap(), Some(answer));
    }

    #[tokio::test]
    async fn test_incremental_ice_fetch() {
        let store = SessionStore::default();
        let code = store.create_session(offer()).await.unwrap();

        let candidates: Vec<_> = (0..5)
            .map(|i| IceCandidate::new(format!("candidate:{i}")))
            .collect();
        for c in &candidates {
            store
                .post_ice(&code, c.clone(), IceOrigin::Answer)
                .await
                .unwrap();
        }
        store
            .post_ice(&code, IceCandidate::new("other"), IceOrigin::Offer)
            .await
            .unwrap();

        for k in 0..=candidates.len() {
            let batch = store.get_ice(&code, IceOrigin::Answer, k).await;
            assert_eq!(batch.total, 5);
            assert_eq!(batch.candidates, candidates[k..].to_vec());
        }

        let past_end = store.get_ice(&code, IceOrigin::Answer, 9).await;
        assert!(past_end.candidates.is_empty());
        assert_eq!(past_end.total, 5);

        assert_eq!(store.get_ice(&code, IceOrigin::Offer, 0).await.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_not_refreshed_by_reads() {
        let store = SessionStore::new(Duration::from_secs(60));
        let code = store.create_session(offer()).await.unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        store.get_session(&code).await.unwrap();

        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(matches!(
            store.get_session(&code).await,
            Err(Error::SessionNotFound(_))
        ));
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_code_can_be_reissued() {
        let store =
            SessionStore::with_code_source(Duration::from_secs(10), ScriptedCodes::new(&[3, 3]));
        let first = store.create_session(offer()).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        let second = store.create_session(offer()).await.unwrap();
        assert_eq!(first, second);
        assert!(store.get_answer(&second).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(5)));
        store.create_session(offer()).await.unwrap();
        let task = store.spawn_cleanup_task(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(store.sessions.read().await.len(), 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_delete_session() {
        let store = SessionStore::default();
        let code = store.create_session(offer()).await.unwrap();

        store.delete_session(&code).await;
        store.delete_session(&code).await;
        assert!(store.get_session(&code).await.is_err());
    }
}
