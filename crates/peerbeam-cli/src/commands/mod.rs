//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;

use peerbeam_core::config::Config;
use peerbeam_core::connection::PeerLink;
use peerbeam_core::signaling::HttpSignalingClient;
use peerbeam_core::status::Phase;
use peerbeam_core::transfer::SessionContext;
use peerbeam_core::transport::webrtc::WebRtcFactory;

pub mod config;
pub mod receive;
pub mod send;
pub mod serve;

/// Load configuration with graceful fallback to defaults.
///
/// A missing or unparsable config file never blocks a transfer.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Using default configuration: {}", e);
        Config::default()
    })
}

/// Build the session context for a transfer from the configuration.
pub fn session_context(config: &Config, signaling_url: Option<&str>) -> SessionContext {
    let url = signaling_url.unwrap_or(&config.signaling.url);
    tracing::debug!("Using rendezvous server at {}", url);

    SessionContext::new(
        Arc::new(HttpSignalingClient::new(url)),
        Arc::new(WebRtcFactory::from_config(&config.ice)),
    )
    .with_link_config(config.link_config())
    .with_transfer_config(config.transfer_config())
}

/// Fail and stop `link` if it is not connected within `timeout`.
pub fn spawn_connect_timeout(link: PeerLink, timeout: Option<Duration>) -> Option<JoinHandle<()>> {
    let timeout = timeout?;
    let mut status = link.status();

    Some(tokio::spawn(async move {
        let connected = tokio::time::timeout(
            timeout,
            status.wait_for(|s| s.phase >= Phase::Connected),
        )
        .await
        .is_ok();

        if !connected {
            link.fail(&peerbeam_core::Error::Timeout(timeout.as_secs()))
                .await;
            link.stop().await;
        }
    }))
}

/// Print a failed transfer with the matching hint, if there is one.
pub fn print_failure(err: &anyhow::Error) {
    eprintln!();
    eprintln!("  Transfer failed: {:#}", err);

    if let Some(suggestion) = err
        .downcast_ref::<peerbeam_core::Error>()
        .and_then(peerbeam_core::Error::suggestion)
    {
        eprintln!();
        for line in suggestion.lines() {
            eprintln!("  {}", line.trim_start());
        }
    }
    eprintln!();
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    match crate::ui::parse_duration(s) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid duration '{s}' (try 30s, 5m)")),
    }
}

/// PeerBeam - Direct peer-to-peer file transfer
#[derive(Parser)]
#[command(name = "peerbeam")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send a file and print the code for the receiver
    Send(SendArgs),

    /// Receive a file using a session code
    Receive(ReceiveArgs),

    /// Run the rendezvous server
    Serve(ServeArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    /// Give up if no receiver connects within this time (e.g., 30s, 5m)
    #[arg(short, long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Rendezvous server URL
    #[arg(long, env = "PEERBEAM_SIGNALING_URL")]
    pub signaling_url: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Session code from the sender
    pub code: String,

    /// Output directory for the received file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Give up if the connection is not up within this time (e.g., 30s, 5m)
    #[arg(short, long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Rendezvous server URL
    #[arg(long, env = "PEERBEAM_SIGNALING_URL")]
    pub signaling_url: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// Session lifetime (e.g., 30m, 1h)
    #[arg(long, value_parser = parse_timeout)]
    pub ttl: Option<Duration>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key (e.g., signaling.url)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Value to set
        value: String,
    },

    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Reset to defaults
    Reset,
}
