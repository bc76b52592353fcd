//! UI utilities for PeerBeam CLI.

use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::watch;

use peerbeam_core::file::format_size;
use peerbeam_core::status::{Phase, Status};

const BOX_WIDTH: usize = 33;
const BAR_WIDTH: usize = 24;

/// A formatted box for displaying session codes.
pub struct CodeBox<'a> {
    code: &'a str,
    timeout: Option<&'a str>,
}

impl<'a> CodeBox<'a> {
    /// Create a new code box.
    #[must_use]
    pub const fn new(code: &'a str) -> Self {
        Self {
            code,
            timeout: None,
        }
    }

    /// Show how long the sender waits for a receiver.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: &'a str) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Display the code box to stdout.
    pub fn display(&self) {
        let code_line = format!("Code:  {}", format_code_spaced(self.code));

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));

        if let Some(timeout) = self.timeout {
            let timeout_line = format!("Waiting up to {}", timeout);
            println!("  │{}│", center_in_box(&timeout_line, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

/// Split a code into groups of three for reading aloud.
fn format_code_spaced(code: &str) -> String {
    code.chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Parse a duration string like "500ms", "30s", "5m", or "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_millis(num))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num * 60))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num * 3600))
    } else {
        None
    }
}

/// Format a duration in the largest unit that divides it.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        return format!("{}ms", duration.as_millis());
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn progress_bar(progress: u8) -> String {
    let filled = usize::from(progress.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn progress_line(status: &Status) -> String {
    format!(
        "\r  {} {:>3}%  {} / {}    ",
        progress_bar(status.progress),
        status.progress,
        format_size(status.bytes_transferred),
        format_size(status.total_bytes)
    )
}

/// Render the status stream until the attempt ends.
///
/// `peer` names the other side ("sender" or "receiver").
pub async fn display_progress(mut rx: watch::Receiver<Status>, peer: &'static str) {
    let mut last_phase = Phase::Idle;
    let mut line_open = false;

    loop {
        let status = rx.borrow_and_update().clone();

        if status.phase != last_phase {
            last_phase = status.phase;
            if line_open {
                println!();
                line_open = false;
            }

            match status.phase {
                Phase::WaitingPeer => {
                    print!("  Waiting for {}...", peer);
                    let _ = io::stdout().flush();
                    line_open = true;
                }
                Phase::Connected => println!("  Connected to {}.", peer),
                Phase::Completed => {
                    print!("{}", progress_line(&status));
                    println!();
                    break;
                }
                Phase::Error => break,
                Phase::Idle | Phase::Initializing | Phase::Transferring => {}
            }
        }

        if status.phase == Phase::Transferring {
            print!("{}", progress_line(&status));
            let _ = io::stdout().flush();
            line_open = true;
        }

        if rx.changed().await.is_err() {
            break;
        }
    }

    if line_open {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_code_spaced() {
        assert_eq!(format_code_spaced("482913"), "482 913");
        assert_eq!(format_code_spaced("0042"), "004 2");
    }

    #[test]
    fn test_center_in_box() {
        let centered = center_in_box("hello", 11);
        assert_eq!(centered, "   hello   ");

        let centered = center_in_box("hi", 6);
        assert_eq!(centered, "  hi  ");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), format!("[{}]", "-".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(100), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(
            progress_bar(50),
            format!("[{}{}]", "#".repeat(12), "-".repeat(12))
        );
    }
}
