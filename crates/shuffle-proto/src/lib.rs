//! Wire format for the shuffle coordination protocol.
//!
//! Every message exchanged with the coordination server is a [`Frame`]: an
//! 8-byte magic, a big-endian `u32` payload length, and a CBOR payload. The
//! payload decodes to [`Packets`], an ordered bundle of [`SignedPacket`]s.
//! A single frame may carry contributions from several participants, so each
//! packet carries its own (optional) ed25519 signature.
//!
//! This crate is purely structural. It knows how to frame, serialize, sign
//! and verify packets, but it never decides whether a packet is acceptable
//! for the current round. That belongs to the channel and the round logic
//! above it.
//!
//! # Security
//!
//! Header parsing goes through `zerocopy` with a compile-time verified
//! layout. Payloads larger than [`FrameHeader::MAX_PAYLOAD_SIZE`] are
//! rejected before any allocation.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod keys;
pub mod message_type;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use frame::{Frame, FrameHeader};
pub use keys::{SessionId, Signature, VerificationKey};
pub use message_type::{MessageType, Phase};
pub use packet::{BlameReason, InputSignature, Packet, PacketBody, Packets, SignedPacket};
