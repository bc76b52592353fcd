//! Rendezvous server tests over real HTTP.
//!
//! A server is bound to an ephemeral localhost port and driven through
//! [`HttpSignalingClient`], the same client the CLI uses.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use peerbeam_core::code::SessionCode;
use peerbeam_core::config::ServerConfig;
use peerbeam_core::rendezvous::server::RendezvousServer;
use peerbeam_core::rendezvous::SessionStore;
use peerbeam_core::signaling::{HttpSignalingClient, IceOrigin, Signaling};
use peerbeam_core::transfer::{ReceiveSession, SendSession};
use peerbeam_core::transport::memory::MemoryNetwork;
use peerbeam_core::transport::{IceCandidate, SessionDescription};
use peerbeam_core::Error;

struct TestServer {
    url: String,
    store: Arc<SessionStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let config = ServerConfig {
        localhost_only: true,
        ..ServerConfig::default()
    };
    let server = RendezvousServer::new(config);
    let store = server.store();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = server
            .serve_with_shutdown(listener, async {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        url: format!("http://{addr}"),
        store,
        shutdown: Some(tx),
    }
}

#[tokio::test]
async fn test_session_lifecycle() {
    let server = start_server().await;
    let client = HttpSignalingClient::new(format!("{}/", server.url));

    let offer = SessionDescription::offer("v=0 offer");
    let code = client.create_session(&offer).await.unwrap();
    assert_eq!(code.as_str().len(), 6);
    assert_eq!(client.get_session(&code).await.unwrap(), offer);
    assert_eq!(client.get_answer(&code).await.unwrap(), None);

    let answer = SessionDescription::answer("v=0 answer");
    client.post_answer(&code, &answer).await.unwrap();
    assert_eq!(client.get_answer(&code).await.unwrap(), Some(answer));

    client.delete_session(&code).await.unwrap();
    assert!(matches!(
        client.get_session(&code).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let server = start_server().await;
    let client = HttpSignalingClient::new(&server.url);
    let code = SessionCode::parse("000001").unwrap();

    assert!(matches!(
        client.get_session(&code).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        client
            .post_answer(&code, &SessionDescription::answer("x"))
            .await,
        Err(Error::SessionNotFound(_))
    ));

    // unknown sessions read as an empty candidate list
    let batch = client.get_ice(&code, IceOrigin::Offer, 0).await.unwrap();
    assert!(batch.candidates.is_empty());
    assert_eq!(batch.total, 0);

    // deleting twice is fine
    client.delete_session(&code).await.unwrap();
}

#[tokio::test]
async fn test_incremental_candidates() {
    let server = start_server().await;
    let client = HttpSignalingClient::new(&server.url);
    let code = client
        .create_session(&SessionDescription::offer("v=0"))
        .await
        .unwrap();

    for n in 0..3 {
        let candidate = IceCandidate::new(format!("candidate:{n} 1 udp 1 10.0.0.1 {n} typ host"));
        client
            .post_ice(&code, &candidate, IceOrigin::Offer)
            .await
            .unwrap();
    }
    client
        .post_ice(&code, &IceCandidate::new("answer-side"), IceOrigin::Answer)
        .await
        .unwrap();

    let all = client.get_ice(&code, IceOrigin::Offer, 0).await.unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.candidates.len(), 3);
    assert_eq!(all.candidates[0].sdp_mline_index, Some(0));

    let tail = client.get_ice(&code, IceOrigin::Offer, 2).await.unwrap();
    assert_eq!(tail.total, 3);
    assert_eq!(tail.candidates, all.candidates[2..]);

    let past_end = client.get_ice(&code, IceOrigin::Offer, 7).await.unwrap();
    assert!(past_end.candidates.is_empty());
    assert_eq!(past_end.total, 3);

    let other = client.get_ice(&code, IceOrigin::Answer, 0).await.unwrap();
    assert_eq!(other.total, 1);
}

#[tokio::test]
async fn test_malformed_code_is_rejected() {
    let server = start_server().await;
    let response = reqwest::get(format!("{}/session/12ab", server.url))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_transfer_through_http_rendezvous() {
    let server = start_server().await;
    let temp = common::create_temp_dir();
    let data = common::random_bytes(150_000);
    let source = common::create_test_file(temp.path(), "notes.txt", &data);

    let network = MemoryNetwork::new();
    let sender_ctx = common::memory_context(Arc::new(HttpSignalingClient::new(&server.url)), &network);
    let receiver_ctx =
        common::memory_context(Arc::new(HttpSignalingClient::new(&server.url)), &network);

    let sender = SendSession::start(sender_ctx, &source).await.unwrap();
    let code = sender.code().clone();
    let receiver = ReceiveSession::start(receiver_ctx, &code).await.unwrap();

    let out = temp.path().join("received");
    let (sent, written) = tokio::time::timeout(
        Duration::from_secs(20),
        async { tokio::join!(sender.run(), receiver.run(&out)) },
    )
    .await
    .expect("transfer timed out");

    assert_eq!(sent.unwrap(), 150_000);
    common::assert_files_equal(&source, &written.unwrap());
    assert!(server.store.is_empty().await);
}
