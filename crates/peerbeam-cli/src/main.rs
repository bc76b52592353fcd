//! PeerBeam CLI - Direct peer-to-peer file transfer
//!
//! PeerBeam sends a single file straight to another peer. A rendezvous
//! server only relays the connection setup behind a 6-digit code.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a rendezvous server
//! peerbeam serve
//!
//! # Send a file
//! peerbeam send ./document.pdf
//!
//! # Receive it (on another machine)
//! peerbeam receive 482913
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Config(args) => commands::config::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,peerbeam=info,peerbeam_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
