//! Send command implementation.

use std::time::Instant;

use anyhow::{Context, Result};

use peerbeam_core::file::format_size;
use peerbeam_core::transfer::SendSession;

use super::SendArgs;
use crate::ui::{self, CodeBox};

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config();
    let ctx = super::session_context(&config, args.signaling_url.as_deref());
    let interactive = !args.quiet && !args.json;

    if interactive {
        println!();
        println!("PeerBeam v{}", peerbeam_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
    }

    let session = SendSession::start(ctx, &args.file)
        .await
        .with_context(|| format!("Failed to start sending {}", args.file.display()));
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            if interactive {
                super::print_failure(&e);
            }
            return Err(e);
        }
    };

    let metadata = session.metadata().clone();
    let code = session.code().clone();

    if args.json {
        let output = serde_json::json!({
            "status": "waiting",
            "code": code.as_str(),
            "file": {
                "name": &metadata.name,
                "size": metadata.size,
                "mimeType": &metadata.mime_type,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.quiet {
        println!("{}", code);
    } else {
        println!(
            "  Sending {} ({})",
            metadata.name,
            format_size(metadata.size)
        );
        println!();
        let timeout = args.timeout.map(ui::format_duration);
        let mut code_box = CodeBox::new(code.as_str());
        if let Some(timeout) = timeout.as_deref() {
            code_box = code_box.with_timeout(timeout);
        }
        code_box.display();
        println!();
        println!("  On the other machine, run: peerbeam receive {}", code);
        println!();
    }

    let link = session.link();
    let watchdog = super::spawn_connect_timeout(link.clone(), args.timeout);
    let progress_handle =
        interactive.then(|| tokio::spawn(ui::display_progress(session.status(), "receiver")));

    let start_time = Instant::now();
    let result = tokio::select! {
        result = session.run() => result,
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
        Ok(sent) => {
            if interactive {
                println!();
                println!(
                    "  Transfer complete! {} in {:.1}s",
                    format_size(sent),
                    start_time.elapsed().as_secs_f64()
                );
                println!();
            }
            if args.json {
                let output = serde_json::json!({
                    "status": "complete",
                    "code": code.as_str(),
                    "total_sent": sent,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Ok(())
        }
        Err(e) => {
            let err = anyhow::Error::new(e).context(format!("Sending {} failed", metadata.name));
            if interactive {
                super::print_failure(&err);
            }
            Err(err)
        }
    }
}
