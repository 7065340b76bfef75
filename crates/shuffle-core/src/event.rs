//! Events published by the channel.

use shuffle_proto::VerificationKey;

use crate::{ServerAddress, message::MessageSummary, roster::Player};

/// Kind of connection-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionErrorKind {
    /// Server address missing or malformed; no connection was attempted
    BadAddress,
    /// Transport failed (DNS, refused, mid-stream I/O); connection is dead
    TransportError,
    /// One frame could not be decoded; connection stays open
    MalformedMessage,
}

/// Kind of peer misbehavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Signature missing from the roster or not verifying
    BadSignature,
}

/// Participant blamed for a violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Culprit {
    /// Signer resolved to a known player
    Player(Player),
    /// Signer key matched nobody on the roster
    Unknown {
        /// Key the packet claimed to be from
        key: VerificationKey,
    },
}

impl Culprit {
    /// Key the offending packet was attributed to
    pub fn key(&self) -> &VerificationKey {
        match self {
            Self::Player(player) => &player.verification_key,
            Self::Unknown { key } => key,
        }
    }
}

/// Tag of a [`ChannelEvent`], used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`ChannelEvent::Connected`]
    Connected,
    /// [`ChannelEvent::Disconnected`]
    Disconnected,
    /// [`ChannelEvent::ConnectionError`]
    ConnectionError,
    /// [`ChannelEvent::ServerMessage`]
    ServerMessage,
    /// [`ChannelEvent::ProtocolViolation`]
    ProtocolViolation,
}

impl EventKind {
    /// Every kind
    pub const ALL: [Self; 5] = [
        Self::Connected,
        Self::Disconnected,
        Self::ConnectionError,
        Self::ServerMessage,
        Self::ProtocolViolation,
    ];
}

/// Observable channel event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Transport handshake completed
    Connected {
        /// Server we are connected to
        address: ServerAddress,
    },

    /// Transport closed, by the peer or locally
    Disconnected {
        /// Close reason as reported by the transport
        reason: String,
    },

    /// Connection-level failure
    ConnectionError {
        /// What failed
        kind: ConnectionErrorKind,
        /// Human-readable detail
        detail: String,
    },

    /// A sub-packet was accepted (unsigned, or signature verified)
    ServerMessage {
        /// Signature-free view of the message
        summary: MessageSummary,
    },

    /// A sub-packet's signature failed verification
    ProtocolViolation {
        /// What went wrong
        kind: ViolationKind,
        /// Who is blamed
        culprit: Culprit,
        /// Message that carried the offending sub-packet
        message: MessageSummary,
    },
}

impl ChannelEvent {
    /// Tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::ConnectionError { .. } => EventKind::ConnectionError,
            Self::ServerMessage { .. } => EventKind::ServerMessage,
            Self::ProtocolViolation { .. } => EventKind::ProtocolViolation,
        }
    }
}
