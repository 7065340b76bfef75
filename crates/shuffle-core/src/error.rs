//! Error types for the channel.
//!
//! Split by where the error surfaces:
//! - [`ConfigError`], [`ConnectionError`]: connection setup and state
//!   transitions
//! - [`DecodeError`]: inbound frames (surfaced as `MalformedMessage` events)
//! - [`EncodeError`], [`SendError`]: returned synchronously to senders
//! - [`ExportError`]: debug dumps only, never the data path

use shuffle_proto::{MessageType, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionState;

/// Invalid channel configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No server URI configured, or an empty one
    #[error("no server URI configured")]
    MissingServerUri,

    /// URI could not be parsed
    #[error("invalid server URI {uri:?}: {reason}")]
    InvalidServerUri {
        /// URI as given
        uri: String,
        /// Parser message
        reason: String,
    },

    /// Scheme other than `ws` / `wss`
    #[error("unsupported scheme {scheme:?}: expected ws or wss")]
    UnsupportedScheme {
        /// Scheme as given
        scheme: String,
    },
}

/// Connection lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not allowed in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Server address failed validation
    #[error("bad server address: {0}")]
    BadAddress(#[from] ConfigError),
}

/// Inbound frame could not be decoded or classified
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Framing or CBOR failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Frame decoded but carried no packets
    #[error("frame carries no packets")]
    Empty,

    /// Frame exceeds the configured size limit
    #[error("frame of {size} bytes exceeds configured limit of {max}")]
    TooLarge {
        /// Frame size
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// Outbound message could not be encoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Framing or CBOR failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Parameters violate the message's contract
    #[error("invalid {message_type} parameters: {reason}")]
    InvalidParams {
        /// Message being encoded
        message_type: MessageType,
        /// What is wrong
        reason: String,
    },
}

/// Send rejected before any log entry or transport write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Name does not denote an encodable message type
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// Channel is not open
    #[error("cannot send while {state:?}")]
    InvalidState {
        /// Connection state at send time
        state: ConnectionState,
    },

    /// Named parameters do not match the message's parameter contract
    #[error("invalid {message_type} parameters: {reason}")]
    InvalidParams {
        /// Message being sent
        message_type: MessageType,
        /// Deserializer message
        reason: String,
    },

    /// Codec rejected the message
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Driver has stopped; no connection exists any more
    #[error("channel driver has stopped")]
    DriverStopped,
}

impl From<ConnectionError> for SendError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::InvalidState { state, .. } => Self::InvalidState { state },
            ConnectionError::BadAddress(_) => Self::InvalidState { state: ConnectionState::Failed },
        }
    }
}

/// Debug dump could not be serialized or written
#[derive(Error, Debug)]
pub enum ExportError {
    /// JSON serialization failed
    #[error("failed to serialize debug dump: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR serialization failed
    #[error("failed to encode debug dump as CBOR: {0}")]
    Cbor(String),

    /// Writer failed
    #[error("failed to write debug dump: {0}")]
    Io(#[from] std::io::Error),
}
