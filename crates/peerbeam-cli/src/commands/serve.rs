//! Serve command implementation.

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use peerbeam_core::rendezvous::server::RendezvousServer;

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config().server;
    if let Some(port) = args.port {
        config.port = port;
    }
    config.localhost_only |= args.localhost_only;
    if let Some(ttl) = args.ttl {
        config.session_ttl = ttl;
    }

    let ttl = crate::ui::format_duration(config.session_ttl);
    let server = RendezvousServer::new(config);
    let addr = server.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!();
    println!("PeerBeam Rendezvous Server");
    println!("{}", "─".repeat(40));
    println!();
    println!("  http://{}", listener.local_addr().unwrap_or(addr));
    println!("  Sessions expire after {}", ttl);
    println!();
    println!("Press Ctrl+C to stop the server.");

    server
        .serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Rendezvous server failed")?;

    println!();
    println!("Server stopped.");

    Ok(())
}
