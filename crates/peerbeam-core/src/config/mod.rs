//! Configuration management for PeerBeam.
//!
//! This module handles loading, saving, and managing PeerBeam configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/peerbeam/config.toml` |
//! | macOS | `~/Library/Application Support/PeerBeam/config.toml` |
//! | Windows | `%APPDATA%\PeerBeam\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use peerbeam_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Rendezvous: {}", config.signaling.url);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::LinkConfig;
use crate::error::Result;
use crate::transfer::TransferConfig;

/// Main configuration struct for PeerBeam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendezvous client settings
    pub signaling: SignalingConfig,
    /// Transfer settings
    pub transfer: TransferSettings,
    /// Candidate discovery settings
    pub ice: IceConfig,
    /// Rendezvous server settings
    pub server: ServerConfig,
}

/// Rendezvous client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Base URL of the rendezvous API
    pub url: String,
    /// Interval between answer/candidate polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_SIGNALING_URL.to_string(),
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunk size for transfers
    pub chunk_size: usize,
    /// Buffered amount at which the sender pauses
    pub buffered_low_threshold: usize,
    /// Default output directory for received files
    pub output_dir: Option<PathBuf>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            buffered_low_threshold: crate::DEFAULT_BUFFERED_LOW_THRESHOLD,
            output_dir: None,
        }
    }
}

/// Candidate discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![crate::DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// Rendezvous server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Session lifetime, counted from creation
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,
    /// How often expired sessions are purged
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_SERVER_PORT,
            localhost_only: false,
            session_ttl: Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::error::Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::Error::ConfigError(format!("Failed to serialize config: {e}"))
        })?;

        std::fs::write(&path, content)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "peerbeam", "PeerBeam")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Connection settings derived from this configuration.
    #[must_use]
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            poll_interval: self.signaling.poll_interval,
            ..LinkConfig::default()
        }
    }

    /// Transfer engine settings derived from this configuration.
    #[must_use]
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.transfer.chunk_size.max(1),
            buffered_low_threshold: self.transfer.buffered_low_threshold,
        }
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let parse = |num: &str, unit_ms: u64| match num.parse::<u64>() {
            Ok(0) => Err(serde::de::Error::custom("duration must be greater than zero")),
            Ok(n) => Ok(Duration::from_millis(n * unit_ms)),
            Err(e) => Err(serde::de::Error::custom(e)),
        };

        if let Some(ms) = s.strip_suffix("ms") {
            parse(ms, 1)
        } else if let Some(secs) = s.strip_suffix('s') {
            parse(secs, 1000)
        } else if let Some(mins) = s.strip_suffix('m') {
            parse(mins, 60 * 1000)
        } else if let Some(hours) = s.strip_suffix('h') {
            parse(hours, 60 * 60 * 1000)
        } else {
            Err(serde::de::Error::custom("invalid duration format"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.signaling.url, crate::DEFAULT_SIGNALING_URL);
        assert_eq!(config.transfer.chunk_size, 64 * 1024);
        assert_eq!(config.server.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.ice.stun_servers.len(), 1);
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.signaling.url = "https://beam.example.org".to_string();
        original.signaling.poll_interval = Duration::from_millis(250);
        original.transfer.chunk_size = 16 * 1024;
        original.server.port = 8088;

        let content = toml::to_string_pretty(&original).expect("serialize");
        std::fs::write(&config_path, &content).expect("write");

        let loaded_content = std::fs::read_to_string(&config_path).expect("read");
        let loaded: Config = toml::from_str(&loaded_content).expect("parse");

        assert_eq!(loaded.signaling.url, "https://beam.example.org");
        assert_eq!(loaded.signaling.poll_interval, Duration::from_millis(250));
        assert_eq!(loaded.transfer.chunk_size, 16 * 1024);
        assert_eq!(loaded.server.port, 8088);
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[signaling]
url = "http://10.0.0.2:3000"

[server]
session_ttl = "30m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.signaling.url, "http://10.0.0.2:3000");
        assert_eq!(config.server.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.signaling.poll_interval, Duration::from_secs(1));
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_humantime_duration_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");

        assert!(toml_str.contains("session_ttl = \"3600s\""));
        assert!(toml_str.contains("poll_interval = \"1s\""));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let bad = "[signaling]\npoll_interval = \"soon\"\n";
        assert!(toml::from_str::<Config>(bad).is_err());

        let zero = "[signaling]\npoll_interval = \"0s\"\n";
        assert!(toml::from_str::<Config>(zero).is_err());

        let zero = "[server]\ncleanup_interval = \"0ms\"\n";
        assert!(toml::from_str::<Config>(zero).is_err());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::default();
        config.signaling.poll_interval = Duration::from_millis(300);
        config.transfer.chunk_size = 0;

        assert_eq!(config.link_config().poll_interval, Duration::from_millis(300));
        assert_eq!(config.transfer_config().chunk_size, 1);
    }
}
