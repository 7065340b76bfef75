//! Error types for the shuffle wire format.
//!
//! All errors are structured and comparable so tests can match on the exact
//! failure instead of on rendered strings.

use thiserror::Error;

/// Errors raised while framing, serializing or interpreting wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Framing
    /// Input is shorter than the fixed header
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum size in bytes
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Frame does not start with the protocol magic
    #[error("invalid magic number: expected 42bcc32e228c6444")]
    InvalidMagic,

    /// Payload exceeds the maximum allowed size
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Header claims more payload bytes than were received
    #[error("frame truncated: header claims {expected} payload bytes, but only {actual} available")]
    FrameTruncated {
        /// Payload size from the header
        expected: usize,
        /// Bytes available after the header
        actual: usize,
    },

    /// Bytes follow the payload the header announced
    #[error("payload size mismatch: header says {header} bytes, actual {actual}")]
    PayloadSizeMismatch {
        /// Size claimed in the header
        header: usize,
        /// Bytes actually present
        actual: usize,
    },

    // CBOR
    /// Failed to encode CBOR
    #[error("failed to encode CBOR: {0}")]
    CborEncode(String),

    /// Failed to decode CBOR
    #[error("failed to decode CBOR: {0}")]
    CborDecode(String),

    // Interpretation
    /// Name does not match any message type
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// Key material has the wrong length or is not valid hex
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Result alias for wire-format operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
