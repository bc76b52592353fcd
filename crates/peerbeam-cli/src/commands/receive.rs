//! Receive command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use peerbeam_core::code::SessionCode;
use peerbeam_core::transfer::ReceiveSession;

use super::ReceiveArgs;
use crate::ui;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config();
    let code = SessionCode::parse(&args.code)
        .with_context(|| format!("'{}' is not a session code", args.code))?;
    let interactive = !args.quiet && !args.json;

    let output_dir = args
        .output
        .or_else(|| config.transfer.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    if interactive {
        println!();
        println!("PeerBeam v{}", peerbeam_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Joining session {}...", code.as_str());
        println!();
    }

    let ctx = super::session_context(&config, args.signaling_url.as_deref());
    let session = match ReceiveSession::start(ctx, &code)
        .await
        .with_context(|| format!("Failed to join session {}", code))
    {
        Ok(session) => session,
        Err(e) => {
            if interactive {
                super::print_failure(&e);
            }
            return Err(e);
        }
    };

    let link = session.link();
    let watchdog = super::spawn_connect_timeout(link.clone(), args.timeout);
    let progress_handle =
        interactive.then(|| tokio::spawn(ui::display_progress(session.status(), "sender")));

    let result = tokio::select! {
        result = session.run(&output_dir) => result,
        _ = tokio::signal::ctrl_c() => {
            link.stop().await;
            Err(peerbeam_core::Error::Cancelled)
        }
    };

    if let Some(handle) = watchdog {
        handle.abort();
    }
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    match result {
        Ok(path) => {
            if interactive {
                println!();
                println!("  Transfer complete!");
                println!();
                println!("  Saved to: {}", path.display());
                println!();
            }
            if args.json {
                let output = serde_json::json!({
                    "status": "complete",
                    "code": code.as_str(),
                    "path": path.display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if args.quiet {
                println!("{}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            let err = anyhow::Error::new(e).context(format!("Receiving from {} failed", code));
            if interactive {
                super::print_failure(&err);
            }
            Err(err)
        }
    }
}
