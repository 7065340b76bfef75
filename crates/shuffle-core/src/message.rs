//! Inbound and outbound message values.
//!
//! Inbound frames become a [`ClassifiedMessage`]: the full decoded
//! [`Packets`] plus a signature-free [`MessageSummary`] that is safe to log
//! and hand to subscribers.
//!
//! Outbound intent is an [`OutboundMessage`], a closed enum of the message
//! kinds a client is allowed to send, each with its own parameter struct.
//! Encoding it yields an [`EncodedMessage`] carrying the packed bytes for
//! the transport and the unpacked views for the audit log.

use bytes::Bytes;
use ciborium::Value;
use serde::{Deserialize, Serialize};
use shuffle_proto::{
    BlameReason, InputSignature, MessageType, Packet, PacketBody, Packets, Phase, SessionId,
    SignedPacket, VerificationKey,
};

use crate::error::{DecodeError, EncodeError, SendError};

/// Signature-free view of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Classification of the message
    pub message_type: MessageType,
    /// Packet contents in wire order, signatures stripped
    pub packets: Vec<Packet>,
}

impl MessageSummary {
    /// Summary of `packets` under `message_type`
    pub fn from_packets(message_type: MessageType, packets: &Packets) -> Self {
        Self {
            message_type,
            packets: packets.packets.iter().map(|signed| signed.packet.clone()).collect(),
        }
    }
}

/// One decoded and classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    message_type: MessageType,
    summary: MessageSummary,
    full: Packets,
}

impl ClassifiedMessage {
    /// Classify a decoded bundle by its first packet.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Empty`] if the bundle carries no packets.
    pub fn classify(full: Packets) -> Result<Self, DecodeError> {
        let first = full.packets.first().ok_or(DecodeError::Empty)?;
        let message_type = first.packet.message_type();
        let summary = MessageSummary::from_packets(message_type, &full);
        Ok(Self { message_type, summary, full })
    }

    /// Message classification
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Signature-free summary
    pub fn summary(&self) -> &MessageSummary {
        &self.summary
    }

    /// Full decoded value, signatures included
    pub fn full(&self) -> &Packets {
        &self.full
    }

    /// Sub-packets in wire order
    pub fn sub_packets(&self) -> &[SignedPacket] {
        &self.full.packets
    }

    /// Session of the first sub-packet
    pub fn session(&self) -> Option<&SessionId> {
        self.full.packets.first().map(|signed| &signed.packet.session)
    }
}

/// Result of encoding an [`OutboundMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    /// Classification of the message
    pub message_type: MessageType,
    /// Complete frame, ready for the transport
    pub packed: Bytes,
    /// Decoded view, signatures included
    pub unpacked: Packets,
    /// Signature-free view
    pub components: MessageSummary,
}

/// Parameters of [`OutboundMessage::Registration`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationParams {
    /// Protocol version
    pub version: u32,
    /// Pool denomination in satoshis
    pub amount: u64,
}

/// Parameters of [`OutboundMessage::EncryptionKey`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Ephemeral encryption public key (hex)
    pub key: String,
}

/// Parameters of [`OutboundMessage::Shuffle`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Next player in the chain
    pub to_key: VerificationKey,
    /// Shuffled ciphertexts
    pub ciphertexts: Vec<Vec<u8>>,
}

/// Parameters of [`OutboundMessage::Broadcast`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Output addresses in shuffled order
    pub addresses: Vec<String>,
}

/// Parameters of [`OutboundMessage::EquivocationCheck`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivocationCheckParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Digest over the announced keys and outputs
    pub digest: Vec<u8>,
}

/// Parameters of [`OutboundMessage::Signatures`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturesParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Signatures over our transaction inputs
    pub inputs: Vec<InputSignature>,
}

/// Parameters of [`OutboundMessage::Blame`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameParams {
    /// Session assigned on registration
    pub session: SessionId,
    /// Our player number
    pub number: u32,
    /// Accused participant
    pub accused: VerificationKey,
    /// Why
    pub reason: BlameReason,
}

/// A message the client may send
///
/// Server-originated types (`registered`, `playerCount`, `notice`) have no
/// variant and cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Join a pool
    Registration(RegistrationParams),
    /// Announce an encryption key
    EncryptionKey(EncryptionKeyParams),
    /// Pass shuffled ciphertexts on
    Shuffle(ShuffleParams),
    /// Broadcast the final output list
    Broadcast(BroadcastParams),
    /// Publish the equivocation-check digest
    EquivocationCheck(EquivocationCheckParams),
    /// Publish input signatures
    Signatures(SignaturesParams),
    /// Accuse a participant
    Blame(BlameParams),
}

impl OutboundMessage {
    /// Build a message from a wire name and a parameter value.
    ///
    /// This is the entry point for callers that only know the message kind
    /// at runtime.
    ///
    /// # Errors
    ///
    /// - [`SendError::UnknownMessageType`] if `name` is not a sendable kind
    /// - [`SendError::InvalidParams`] if `params` does not match the kind's
    ///   parameter struct
    pub fn from_named(name: &str, params: &Value) -> Result<Self, SendError> {
        let message_type = Self::sendable_type(name)?;

        let invalid = |e: ciborium::value::Error| SendError::InvalidParams {
            message_type,
            reason: e.to_string(),
        };

        let message = match message_type {
            MessageType::Registration => Self::Registration(params.deserialized().map_err(invalid)?),
            MessageType::Announcement => {
                Self::EncryptionKey(params.deserialized().map_err(invalid)?)
            },
            MessageType::Shuffle => Self::Shuffle(params.deserialized().map_err(invalid)?),
            MessageType::Broadcast => Self::Broadcast(params.deserialized().map_err(invalid)?),
            MessageType::EquivocationCheck => {
                Self::EquivocationCheck(params.deserialized().map_err(invalid)?)
            },
            MessageType::Signing => Self::Signatures(params.deserialized().map_err(invalid)?),
            MessageType::Blame => Self::Blame(params.deserialized().map_err(invalid)?),
            MessageType::Registered | MessageType::PlayerCount | MessageType::Notice => {
                return Err(SendError::UnknownMessageType(name.to_string()));
            },
        };

        Ok(message)
    }

    /// Resolve a wire name to a type the client may send.
    ///
    /// # Errors
    ///
    /// [`SendError::UnknownMessageType`] for unknown names and for
    /// server-originated types.
    pub fn sendable_type(name: &str) -> Result<MessageType, SendError> {
        match name.parse::<MessageType>() {
            Ok(MessageType::Registered | MessageType::PlayerCount | MessageType::Notice) | Err(_) => {
                Err(SendError::UnknownMessageType(name.to_string()))
            },
            Ok(message_type) => Ok(message_type),
        }
    }

    /// Audit-log bucket this message lands in
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Registration(_) => MessageType::Registration,
            Self::EncryptionKey(_) => MessageType::Announcement,
            Self::Shuffle(_) => MessageType::Shuffle,
            Self::Broadcast(_) => MessageType::Broadcast,
            Self::EquivocationCheck(_) => MessageType::EquivocationCheck,
            Self::Signatures(_) => MessageType::Signing,
            Self::Blame(_) => MessageType::Blame,
        }
    }

    /// Phase stamped on the outgoing packet
    pub fn phase(&self) -> Phase {
        match self {
            Self::Registration(_) => Phase::None,
            Self::EncryptionKey(_) => Phase::Announcement,
            Self::Shuffle(_) => Phase::Shuffle,
            Self::Broadcast(_) => Phase::Broadcast,
            Self::EquivocationCheck(_) => Phase::EquivocationCheck,
            Self::Signatures(_) => Phase::Signing,
            Self::Blame(_) => Phase::Blame,
        }
    }

    /// True if the packet is sent with a signature
    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::Registration(_))
    }

    /// Check the parameter contract.
    ///
    /// # Errors
    ///
    /// [`EncodeError::InvalidParams`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), EncodeError> {
        let reason = match self {
            Self::Registration(p) if p.amount == 0 => Some("amount must be positive"),
            Self::Registration(_) => None,
            Self::EncryptionKey(p) => session_rule(&p.session, p.number)
                .or_else(|| p.key.is_empty().then_some("empty encryption key")),
            Self::Shuffle(p) => session_rule(&p.session, p.number)
                .or_else(|| p.ciphertexts.is_empty().then_some("no ciphertexts")),
            Self::Broadcast(p) => session_rule(&p.session, p.number)
                .or_else(|| p.addresses.is_empty().then_some("no addresses")),
            Self::EquivocationCheck(p) => session_rule(&p.session, p.number)
                .or_else(|| p.digest.is_empty().then_some("empty digest")),
            Self::Signatures(p) => session_rule(&p.session, p.number)
                .or_else(|| p.inputs.is_empty().then_some("no input signatures")),
            Self::Blame(p) => session_rule(&p.session, p.number),
        };

        match reason {
            Some(reason) => Err(EncodeError::InvalidParams {
                message_type: self.message_type(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Packet carrying this message, attributed to `from_key`
    pub fn to_packet(&self, from_key: VerificationKey) -> Packet {
        let (session, number, to_key, body) = match self {
            Self::Registration(p) => (
                SessionId::default(),
                0,
                None,
                PacketBody::Registration { version: p.version, amount: p.amount },
            ),
            Self::EncryptionKey(p) => {
                (p.session.clone(), p.number, None, PacketBody::EncryptionKey { key: p.key.clone() })
            },
            Self::Shuffle(p) => (
                p.session.clone(),
                p.number,
                Some(p.to_key),
                PacketBody::Ciphertexts { items: p.ciphertexts.clone() },
            ),
            Self::Broadcast(p) => (
                p.session.clone(),
                p.number,
                None,
                PacketBody::OutputAddresses { addresses: p.addresses.clone() },
            ),
            Self::EquivocationCheck(p) => {
                (p.session.clone(), p.number, None, PacketBody::Hash { digest: p.digest.clone() })
            },
            Self::Signatures(p) => (
                p.session.clone(),
                p.number,
                None,
                PacketBody::Signatures { inputs: p.inputs.clone() },
            ),
            Self::Blame(p) => (
                p.session.clone(),
                p.number,
                None,
                PacketBody::Blame { accused: p.accused, reason: p.reason },
            ),
        };

        Packet { session, number, from_key, to_key, phase: self.phase(), body }
    }
}

fn session_rule(session: &SessionId, number: u32) -> Option<&'static str> {
    if session.is_empty() {
        Some("missing session")
    } else if number == 0 {
        Some("player number must be non-zero")
    } else {
        None
    }
}
