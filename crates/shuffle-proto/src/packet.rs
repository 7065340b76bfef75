//! Packets and their signatures.
//!
//! A frame payload is a [`Packets`] bundle. Each [`SignedPacket`] in the
//! bundle is attributable to exactly one participant (`packet.from_key`) and
//! may carry an ed25519 signature over the CBOR encoding of its [`Packet`].

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, MessageType, Phase,
    errors::{ProtocolError, Result},
    keys::{SessionId, Signature, VerificationKey},
};

/// Reason attached to a blame accusation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlameReason {
    /// Accused does not hold the pool amount
    InsufficientFunds,
    /// Accused spent the coin elsewhere
    DoubleSpend,
    /// Equivocation-check hashes disagree
    EquivocationFailure,
    /// Output missing after the shuffle
    ShuffleFailure,
    /// Both shuffle and equivocation failed
    ShuffleAndEquivocationFailure,
    /// Transaction input signature does not verify
    InvalidSignature,
    /// Accused's output is missing from the final list
    MissingOutput,
    /// Accused lied in a blame message
    Liar,
    /// Malformed message content
    InvalidFormat,
}

/// Signature over one transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature {
    /// Input index within the joint transaction
    pub index: u32,
    /// DER or Schnorr signature bytes, opaque to this layer
    pub signature: Vec<u8>,
}

/// Content of a packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacketBody {
    /// Join request for a pool of `amount`
    Registration {
        /// Protocol version spoken by the client
        version: u32,
        /// Pool denomination in satoshis
        amount: u64,
    },
    /// Registration accepted
    Registered {
        /// Player number assigned by the server
        player_number: u32,
    },
    /// Pool occupancy
    PlayerCount {
        /// Players currently waiting
        count: u32,
    },
    /// Ephemeral encryption public key (hex)
    EncryptionKey {
        /// Public key in hex
        key: String,
    },
    /// Layered ciphertexts passed down the player chain
    Ciphertexts {
        /// Opaque ciphertexts
        items: Vec<Vec<u8>>,
    },
    /// Final shuffled output addresses
    OutputAddresses {
        /// Addresses in shuffled order
        addresses: Vec<String>,
    },
    /// Equivocation-check digest
    Hash {
        /// Digest bytes
        digest: Vec<u8>,
    },
    /// Signatures over the sender's transaction inputs
    Signatures {
        /// Per-input signatures
        inputs: Vec<InputSignature>,
    },
    /// Accusation against another participant
    Blame {
        /// Accused participant
        accused: VerificationKey,
        /// Why
        reason: BlameReason,
    },
    /// Free-form server text
    Notice {
        /// Notice text
        text: String,
    },
}

impl PacketBody {
    /// Message type this body classifies as
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Registration { .. } => MessageType::Registration,
            Self::Registered { .. } => MessageType::Registered,
            Self::PlayerCount { .. } => MessageType::PlayerCount,
            Self::EncryptionKey { .. } => MessageType::Announcement,
            Self::Ciphertexts { .. } => MessageType::Shuffle,
            Self::OutputAddresses { .. } => MessageType::Broadcast,
            Self::Hash { .. } => MessageType::EquivocationCheck,
            Self::Signatures { .. } => MessageType::Signing,
            Self::Blame { .. } => MessageType::Blame,
            Self::Notice { .. } => MessageType::Notice,
        }
    }
}

/// One participant's contribution to a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Session the packet belongs to
    pub session: SessionId,
    /// Sender's player number (0 before registration)
    pub number: u32,
    /// Sender's verification key
    pub from_key: VerificationKey,
    /// Recipient for directed packets
    pub to_key: Option<VerificationKey>,
    /// Round phase at send time
    pub phase: Phase,
    /// Content
    pub body: PacketBody,
}

impl Packet {
    /// Canonical bytes covered by the packet signature (CBOR).
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Message type of this packet
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

/// A packet with its optional signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPacket {
    /// Signed content
    pub packet: Packet,
    /// Signature by `packet.from_key`, if any
    pub signature: Option<Signature>,
}

impl SignedPacket {
    /// Packet without a signature
    pub fn unsigned(packet: Packet) -> Self {
        Self { packet, signature: None }
    }

    /// Sign `packet` with `key`.
    ///
    /// The caller is responsible for `packet.from_key` matching `key`;
    /// a mismatch produces a packet that never verifies.
    pub fn sign(packet: Packet, key: &SigningKey) -> Result<Self> {
        let signature = Signature::create(key, &packet.signing_bytes()?);
        Ok(Self { packet, signature: Some(signature) })
    }

    /// Key that must have produced the signature, if the packet is signed
    pub fn signer(&self) -> Option<&VerificationKey> {
        self.signature.as_ref().map(|_| &self.packet.from_key)
    }

    /// Verify the signature against `key`.
    ///
    /// Unsigned packets and packets whose canonical bytes cannot be produced
    /// never verify.
    pub fn verify(&self, key: &VerificationKey) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.packet.signing_bytes() {
            Ok(bytes) => key.verify(&bytes, signature),
            Err(_) => false,
        }
    }
}

/// Ordered bundle of packets carried by one frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packets {
    /// Packets in wire order
    pub packets: Vec<SignedPacket>,
}

impl Packets {
    /// Bundle the given packets
    pub fn new(packets: Vec<SignedPacket>) -> Self {
        Self { packets }
    }

    /// Serialize to CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR. The input must hold exactly one bundle.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let packets = ciborium::de::from_reader(&mut reader)
            .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;

        if !reader.is_empty() {
            return Err(ProtocolError::CborDecode(format!(
                "{} trailing bytes after packet bundle",
                reader.len()
            )));
        }
        Ok(packets)
    }

    /// Serialize into a frame
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::new(self.to_cbor()?))
    }

    /// Deserialize a frame's payload
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::from_cbor(&frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(key: &SigningKey, body: PacketBody) -> Packet {
        Packet {
            session: SessionId::new(vec![0xab; 4]),
            number: 3,
            from_key: VerificationKey::from_signing_key(key),
            to_key: None,
            phase: Phase::Announcement,
            body,
        }
    }

    #[test]
    fn signed_packet_verifies_under_sender_key() {
        let key = SigningKey::from_bytes(&[9; 32]);
        let signed =
            SignedPacket::sign(packet(&key, PacketBody::EncryptionKey { key: "02ab".into() }), &key)
                .unwrap();

        assert_eq!(signed.signer(), Some(&signed.packet.from_key));
        assert!(signed.verify(&signed.packet.from_key));
    }

    #[test]
    fn tampered_packet_fails_verification() {
        let key = SigningKey::from_bytes(&[9; 32]);
        let mut signed =
            SignedPacket::sign(packet(&key, PacketBody::Hash { digest: vec![1, 2, 3] }), &key)
                .unwrap();
        signed.packet.number = 4;

        assert!(!signed.verify(&signed.packet.from_key));
    }

    #[test]
    fn unsigned_packet_has_no_signer() {
        let key = SigningKey::from_bytes(&[1; 32]);
        let unsigned = SignedPacket::unsigned(packet(&key, PacketBody::PlayerCount { count: 2 }));

        assert_eq!(unsigned.signer(), None);
        assert!(!unsigned.verify(&unsigned.packet.from_key));
    }

    #[test]
    fn signature_survives_cbor_transit() {
        let key = SigningKey::from_bytes(&[5; 32]);
        let bundle = Packets::new(vec![
            SignedPacket::sign(
                packet(&key, PacketBody::OutputAddresses { addresses: vec!["addr".into()] }),
                &key,
            )
            .unwrap(),
        ]);

        let frame = bundle.to_frame().unwrap();
        let decoded = Packets::from_frame(&frame).unwrap();

        assert_eq!(decoded, bundle);
        assert!(decoded.packets[0].verify(&decoded.packets[0].packet.from_key));
    }

    #[test]
    fn trailing_bytes_after_bundle_are_rejected() {
        let key = SigningKey::from_bytes(&[5; 32]);
        let bundle = Packets::new(vec![SignedPacket::unsigned(packet(
            &key,
            PacketBody::PlayerCount { count: 2 },
        ))]);
        let mut cbor = bundle.to_cbor().unwrap();
        cbor.extend_from_slice(b"\xff\xff junk");

        assert_eq!(
            Packets::from_cbor(&cbor),
            Err(ProtocolError::CborDecode("7 trailing bytes after packet bundle".into()))
        );
    }

    #[test]
    fn body_classification() {
        assert_eq!(
            PacketBody::Ciphertexts { items: vec![] }.message_type(),
            MessageType::Shuffle
        );
        assert_eq!(
            PacketBody::Signatures { inputs: vec![] }.message_type(),
            MessageType::Signing
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(Packets::from_cbor(&[0xff, 0x00]), Err(ProtocolError::CborDecode(_))));
    }
}
