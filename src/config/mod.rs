//! Configuration management for the tunnel core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::HandshakeConfig;
use crate::error::{Error, Result};
use crate::protocol::ENVELOPE_SIZE;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tunnel connection configuration.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Handshake configuration.
    #[serde(default)]
    pub handshake: HandshakeConfig,

    /// Key store configuration.
    #[serde(default)]
    pub keystore: KeyStoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tunnel.max_frame_payload <= ENVELOPE_SIZE {
            return Err(Error::Config(format!(
                "max_frame_payload must exceed the {ENVELOPE_SIZE}-byte payload envelope"
            )));
        }
        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "switchboard", "switchboard").map_or_else(
            || PathBuf::from("switchboard.toml"),
            |dirs| dirs.config_dir().join("tunnel.toml"),
        )
    }
}

/// Per-connection tunnel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Maximum frame payload size in bytes. Must exceed the 4-byte
    /// payload envelope.
    #[serde(default = "default_max_frame_payload")]
    pub max_frame_payload: usize,
}

fn default_max_frame_payload() -> usize {
    crate::protocol::DEFAULT_MAX_FRAME_PAYLOAD
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            max_frame_payload: default_max_frame_payload(),
        }
    }
}

/// Key store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyStoreConfig {
    /// Explicit key location. A directory gets the default file names;
    /// anything else is the private key path with a derived public
    /// sibling. Unset falls back to the environment override, then the
    /// per-user default location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.tunnel.max_frame_payload, 16 << 20);
    }

    #[test]
    fn rejects_max_payload_at_or_below_envelope() {
        let mut config = Config::default();
        config.tunnel.max_frame_payload = ENVELOPE_SIZE;
        assert!(config.validate().is_err());

        config.tunnel.max_frame_payload = ENVELOPE_SIZE + 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tunnel]
            max_frame_payload = 65536

            [handshake]
            read_timeout = "10s"
            "#,
        )
        .unwrap();
        assert_eq!(config.tunnel.max_frame_payload, 65536);
        assert_eq!(
            config.handshake.read_timeout,
            std::time::Duration::from_secs(10)
        );
        assert_eq!(config.logging.level, "info");
        assert!(config.keystore.key_path.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.tunnel.max_frame_payload,
            config.tunnel.max_frame_payload
        );
    }
}
