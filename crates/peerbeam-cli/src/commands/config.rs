//! Config command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use peerbeam_core::config::Config;

use super::{ConfigAction, ConfigArgs};
use crate::ui::{format_duration, parse_duration};

/// Keys accepted by `config get` and `config set`.
const KEYS: &[&str] = &[
    "signaling.url",
    "signaling.poll_interval",
    "transfer.chunk_size",
    "transfer.buffered_low_threshold",
    "transfer.output_dir",
    "ice.stun_servers",
    "server.port",
    "server.localhost_only",
    "server.session_ttl",
    "server.cleanup_interval",
];

/// Run the config command.
pub async fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match get_config_value(&config, &key) {
                Some(v) => println!("{}: {}", key, v),
                None => print_unknown_key(&key),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            if set_config_value(&mut config, &key, &value)? {
                config.save()?;
                println!("Set {} = {}", key, value);
            } else {
                print_unknown_key(&key);
            }
        }

        ConfigAction::Show => {
            let config = Config::load()?;
            println!();
            println!("PeerBeam Configuration");
            println!("{}", "─".repeat(50));
            println!();
            println!("[signaling]");
            println!("  url = \"{}\"", config.signaling.url);
            println!(
                "  poll_interval = \"{}\"",
                format_duration(config.signaling.poll_interval)
            );
            println!();
            println!("[transfer]");
            println!("  chunk_size = {}", config.transfer.chunk_size);
            println!(
                "  buffered_low_threshold = {}",
                config.transfer.buffered_low_threshold
            );
            if let Some(dir) = &config.transfer.output_dir {
                println!("  output_dir = \"{}\"", dir.display());
            }
            println!();
            println!("[ice]");
            println!("  stun_servers = {:?}", config.ice.stun_servers);
            println!();
            println!("[server]");
            println!("  port = {}", config.server.port);
            println!("  localhost_only = {}", config.server.localhost_only);
            println!(
                "  session_ttl = \"{}\"",
                format_duration(config.server.session_ttl)
            );
            println!(
                "  cleanup_interval = \"{}\"",
                format_duration(config.server.cleanup_interval)
            );
            println!();
        }

        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }

        ConfigAction::Reset => {
            Config::default().save()?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}

fn print_unknown_key(key: &str) {
    println!("Unknown configuration key: {}", key);
    println!("Available keys: {}", KEYS.join(", "));
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "signaling.url" => Some(config.signaling.url.clone()),
        "signaling.poll_interval" => Some(format_duration(config.signaling.poll_interval)),
        "transfer.chunk_size" => Some(config.transfer.chunk_size.to_string()),
        "transfer.buffered_low_threshold" => {
            Some(config.transfer.buffered_low_threshold.to_string())
        }
        "transfer.output_dir" => Some(
            config
                .transfer
                .output_dir
                .as_ref()
                .map_or_else(|| "(current directory)".to_string(), |d| d.display().to_string()),
        ),
        "ice.stun_servers" => Some(config.ice.stun_servers.join(",")),
        "server.port" => Some(config.server.port.to_string()),
        "server.localhost_only" => Some(config.server.localhost_only.to_string()),
        "server.session_ttl" => Some(format_duration(config.server.session_ttl)),
        "server.cleanup_interval" => Some(format_duration(config.server.cleanup_interval)),
        _ => None,
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<bool> {
    let duration = |value: &str| match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => bail!("invalid duration '{}' (try 500ms, 30s, 1h)", value),
    };

    match key {
        "signaling.url" => config.signaling.url = value.trim_end_matches('/').to_string(),
        "signaling.poll_interval" => config.signaling.poll_interval = duration(value)?,
        "transfer.chunk_size" => {
            let size: usize = value.parse()?;
            if size == 0 {
                bail!("chunk_size must be at least 1 byte");
            }
            config.transfer.chunk_size = size;
        }
        "transfer.buffered_low_threshold" => {
            config.transfer.buffered_low_threshold = value.parse()?;
        }
        "transfer.output_dir" => {
            config.transfer.output_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        "ice.stun_servers" => {
            config.ice.stun_servers = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        "server.port" => config.server.port = value.parse()?,
        "server.localhost_only" => config.server.localhost_only = value.parse()?,
        "server.session_ttl" => config.server.session_ttl = duration(value)?,
        "server.cleanup_interval" => config.server.cleanup_interval = duration(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_every_key_readable() {
        let config = Config::default();
        for key in KEYS {
            assert!(get_config_value(&config, key).is_some(), "{key}");
        }
        assert!(get_config_value(&config, "general.device_name").is_none());
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();

        assert!(set_config_value(&mut config, "signaling.url", "https://beam.example/").unwrap());
        assert_eq!(config.signaling.url, "https://beam.example");

        assert!(set_config_value(&mut config, "signaling.poll_interval", "500ms").unwrap());
        assert_eq!(config.signaling.poll_interval, Duration::from_millis(500));

        assert!(set_config_value(&mut config, "ice.stun_servers", "stun:a:3478, stun:b:3478").unwrap());
        assert_eq!(config.ice.stun_servers, vec!["stun:a:3478", "stun:b:3478"]);

        assert!(set_config_value(&mut config, "transfer.output_dir", "/tmp/in").unwrap());
        assert_eq!(config.transfer.output_dir, Some(PathBuf::from("/tmp/in")));
        assert!(set_config_value(&mut config, "transfer.output_dir", "").unwrap());
        assert_eq!(config.transfer.output_dir, None);

        assert!(!set_config_value(&mut config, "nope", "1").unwrap());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(set_config_value(&mut config, "transfer.chunk_size", "0").is_err());
        assert!(set_config_value(&mut config, "server.port", "70000").is_err());
        assert!(set_config_value(&mut config, "server.session_ttl", "forever").is_err());
        assert!(set_config_value(&mut config, "signaling.poll_interval", "0s").is_err());
        assert_eq!(config.transfer.chunk_size, peerbeam_core::DEFAULT_CHUNK_SIZE);
    }
}
