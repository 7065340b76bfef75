//! Channel configuration.
//!
//! [`ChannelConfig`] replaces free-form construction options with named,
//! validated fields. It deserializes from any serde format so the bootstrap
//! layer can load it from a file; every field has a default.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use shuffle_proto::FrameHeader;
use url::Url;

use crate::error::ConfigError;

/// Default `Origin` header sent on the WebSocket handshake
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Default depth of the driver's command queue
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Coordination server URI (`ws://` or `wss://`). Required to connect.
    pub server_uri: Option<String>,
    /// `Origin` header for WebSocket transports
    pub origin: String,
    /// Largest accepted frame payload in bytes. Capped at the protocol
    /// maximum of 16 MiB.
    pub max_frame_size: u32,
    /// Pending commands a [`crate::ChannelHandle`] may queue before `send`
    /// waits
    pub command_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_uri: None,
            origin: DEFAULT_ORIGIN.to_string(),
            max_frame_size: FrameHeader::MAX_PAYLOAD_SIZE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl ChannelConfig {
    /// Default configuration pointed at `server_uri`
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self { server_uri: Some(server_uri.into()), ..Self::default() }
    }

    /// Validate `server_uri` into a [`ServerAddress`].
    pub fn server_address(&self) -> Result<ServerAddress, ConfigError> {
        match self.server_uri.as_deref() {
            Some(uri) => uri.parse(),
            None => Err(ConfigError::MissingServerUri),
        }
    }

    /// Frame size limit after applying the protocol cap
    pub fn effective_max_frame_size(&self) -> u32 {
        self.max_frame_size.min(FrameHeader::MAX_PAYLOAD_SIZE)
    }
}

/// Validated coordination server endpoint
///
/// Always a `ws` or `wss` URL with a host. The port falls back to the
/// scheme default (80 / 443).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    url: Url,
    port: u16,
}

impl ServerAddress {
    /// Full URL
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, explicit or scheme default
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, for stream transports that dial directly
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }

    /// True for `wss://`
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl FromStr for ServerAddress {
    type Err = ConfigError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingServerUri);
        }

        let url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidServerUri {
            uri: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::UnsupportedScheme { scheme: url.scheme().to_string() });
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidServerUri {
                uri: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let port = url.port_or_known_default().ok_or_else(|| ConfigError::InvalidServerUri {
            uri: trimmed.to_string(),
            reason: "missing port".to_string(),
        })?;

        Ok(Self { url, port })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.server_uri, None);
        assert_eq!(config.origin, "http://localhost");
        assert_eq!(config.max_frame_size, FrameHeader::MAX_PAYLOAD_SIZE);
        assert_eq!(config.command_capacity, 64);
    }

    #[test]
    fn missing_fields_take_defaults_when_deserializing() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"server_uri":"ws://shuffle.example:1337"}"#).unwrap();
        assert_eq!(config.origin, DEFAULT_ORIGIN);
        assert_eq!(config.server_address().unwrap().port(), 1337);
    }

    #[test]
    fn scheme_default_port() {
        let address: ServerAddress = "wss://shuffle.example/ws".parse().unwrap();
        assert_eq!(address.port(), 443);
        assert_eq!(address.authority(), "shuffle.example:443");
        assert!(address.is_secure());
    }

    #[test]
    fn rejects_missing_and_malformed_uris() {
        assert_eq!(ChannelConfig::default().server_address(), Err(ConfigError::MissingServerUri));
        assert_eq!("   ".parse::<ServerAddress>(), Err(ConfigError::MissingServerUri));
        assert!(matches!(
            "not a uri".parse::<ServerAddress>(),
            Err(ConfigError::InvalidServerUri { .. })
        ));
        assert_eq!(
            "http://shuffle.example".parse::<ServerAddress>(),
            Err(ConfigError::UnsupportedScheme { scheme: "http".into() })
        );
    }

    #[test]
    fn frame_limit_is_capped() {
        let config = ChannelConfig { max_frame_size: u32::MAX, ..ChannelConfig::default() };
        assert_eq!(config.effective_max_frame_size(), FrameHeader::MAX_PAYLOAD_SIZE);
    }
}
