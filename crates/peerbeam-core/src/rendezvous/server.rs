//! HTTP front end for the rendezvous store.
//!
//! | Method | Path | Body / Query | Response |
//! |--------|------|--------------|----------|
//! | POST | `/session` | `{offer}` | `{code}` |
//! | GET | `/session/{code}` | | `{offer}` or 404 `{error}` |
//! | DELETE | `/session/{code}` | | `{success}` |
//! | POST | `/answer/{code}` | `{answer}` | `{success}` or 404 `{error}` |
//! | GET | `/answer/{code}` | | `{answer}` (`null` until posted) |
//! | POST | `/ice/{code}` | `{candidate, type}` | `{success}` |
//! | GET | `/ice/{code}` | `?type=offer\|answer&lastIndex=N` | `{candidates, total}` |
//!
//! CORS is fully permissive so browser peers on any origin can call it.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use super::error::{ApiError, ApiResult};
use super::SessionStore;
use crate::code::SessionCode;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::signaling::messages::{
    AnswerRequest, AnswerResponse, CreateSessionRequest, CreateSessionResponse,
    GetSessionResponse, IceQuery, IceRequest, SuccessResponse,
};
use crate::signaling::IceBatch;

/// Largest accepted request body. Descriptions are a few KiB at most.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Rendezvous HTTP server.
#[derive(Debug)]
pub struct RendezvousServer {
    store: Arc<SessionStore>,
    config: ServerConfig,
}

impl RendezvousServer {
    /// Create a server with a fresh store using the configured TTL.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(SessionStore::new(config.session_ttl));
        Self { store, config }
    }

    /// Create a server over an existing store.
    #[must_use]
    pub fn with_store(config: ServerConfig, store: Arc<SessionStore>) -> Self {
        Self { store, config }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    /// Address to bind from the configuration.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = if self.config.localhost_only {
            Ipv4Addr::LOCALHOST
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        SocketAddr::from((ip, self.config.port))
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.store))
    }

    /// Serve on `listener` until the process exits.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cleanup = self.store.spawn_cleanup_task(self.config.cleanup_interval);
        let app = self.router();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Rendezvous server listening on {}", addr);
        }

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;
        cleanup.abort();
        result.map_err(Into::into)
    }
}

/// Router exposing `store`.
pub fn router(store: Arc<SessionStore>) -> Router {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/{code}", get(get_session).delete(delete_session))
        .route("/answer/{code}", get(get_answer).post(post_answer))
        .route("/ice/{code}", get(get_ice).post(post_ice))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

fn parse_code(raw: &str) -> ApiResult<SessionCode> {
    SessionCode::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn create_session(
    State(store): State<Arc<SessionStore>>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let code = store.create_session(req.offer).await?;
    Ok(Json(CreateSessionResponse { code }))
}

async fn get_session(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
) -> ApiResult<Json<GetSessionResponse>> {
    let code = parse_code(&code)?;
    let offer = store
        .get_session(&code)
        .await
        .map_err(|_| ApiError::not_found("Session not found"))?;
    Ok(Json(GetSessionResponse { offer }))
}

async fn delete_session(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let code = parse_code(&code)?;
    store.delete_session(&code).await;
    Ok(Json(SuccessResponse::ok()))
}

async fn post_answer(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let code = parse_code(&code)?;
    store
        .post_answer(&code, req.answer)
        .await
        .map_err(|_| ApiError::not_found("Session not found"))?;
    Ok(Json(SuccessResponse::ok()))
}

async fn get_answer(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
) -> ApiResult<Json<AnswerResponse>> {
    let code = parse_code(&code)?;
    let answer = store.get_answer(&code).await?;
    Ok(Json(AnswerResponse { answer }))
}

async fn post_ice(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
    Json(req): Json<IceRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let code = parse_code(&code)?;
    store.post_ice(&code, req.candidate, req.origin).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn get_ice(
    State(store): State<Arc<SessionStore>>,
    Path(code): Path<String>,
    Query(query): Query<IceQuery>,
) -> ApiResult<Json<IceBatch>> {
    let code = parse_code(&code)?;
    Ok(Json(
        store.get_ice(&code, query.origin, query.last_index).await,
    ))
}
