//! Codec boundary.
//!
//! The channel never parses bytes itself. It hands raw frames to a
//! [`MessageCodec`] and consumes what comes back. [`CborCodec`] is the
//! reference implementation over the `shuffle-proto` wire format.

use ed25519_dalek::SigningKey;
use shuffle_proto::{Frame, FrameHeader, Packets, SignedPacket, VerificationKey};

use crate::{
    config::ChannelConfig,
    error::{DecodeError, EncodeError},
    message::{ClassifiedMessage, EncodedMessage, MessageSummary, OutboundMessage},
};

/// Wire-format codec used by the channel.
///
/// Implementations must be pure with respect to the channel: a decode or
/// encode failure is reported as an error, never as a panic.
pub trait MessageCodec {
    /// Decode one raw frame and classify it.
    fn decode_and_classify(&self, frame: &[u8]) -> Result<ClassifiedMessage, DecodeError>;

    /// Encode an outbound message into a complete frame.
    fn encode(&self, message: &OutboundMessage) -> Result<EncodedMessage, EncodeError>;

    /// Check `packet`'s signature against `key`.
    fn verify_signature(&self, packet: &SignedPacket, key: &VerificationKey) -> bool;
}

/// CBOR codec over `shuffle-proto` frames
///
/// Every outbound packet except `registration` is signed with the codec's
/// key and attributed to the matching verification key.
pub struct CborCodec {
    signing_key: SigningKey,
    from_key: VerificationKey,
    max_frame_size: usize,
}

impl CborCodec {
    /// Codec signing with `signing_key`, accepting payloads up to the
    /// protocol maximum
    pub fn new(signing_key: SigningKey) -> Self {
        let from_key = VerificationKey::from_signing_key(&signing_key);
        Self { signing_key, from_key, max_frame_size: FrameHeader::MAX_PAYLOAD_SIZE as usize }
    }

    /// Codec applying `config`'s frame size limit
    pub fn from_config(signing_key: SigningKey, config: &ChannelConfig) -> Self {
        Self::new(signing_key).with_max_frame_size(config.effective_max_frame_size())
    }

    /// Lower the accepted payload size.
    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max.min(FrameHeader::MAX_PAYLOAD_SIZE) as usize;
        self
    }

    /// Key outbound packets are attributed to
    pub fn verification_key(&self) -> VerificationKey {
        self.from_key
    }
}

impl std::fmt::Debug for CborCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CborCodec")
            .field("from_key", &self.from_key)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

impl MessageCodec for CborCodec {
    fn decode_and_classify(&self, frame: &[u8]) -> Result<ClassifiedMessage, DecodeError> {
        let header = FrameHeader::from_bytes(frame)?;
        let size = header.payload_size() as usize;
        if size > self.max_frame_size {
            return Err(DecodeError::TooLarge { size, max: self.max_frame_size });
        }

        let frame = Frame::decode(frame)?;
        let packets = Packets::from_frame(&frame)?;
        ClassifiedMessage::classify(packets)
    }

    fn encode(&self, message: &OutboundMessage) -> Result<EncodedMessage, EncodeError> {
        message.validate()?;

        let packet = message.to_packet(self.from_key);
        let signed = if message.is_signed() {
            SignedPacket::sign(packet, &self.signing_key)?
        } else {
            SignedPacket::unsigned(packet)
        };

        let unpacked = Packets::new(vec![signed]);
        let packed = unpacked.to_frame()?.to_bytes()?;
        let message_type = message.message_type();

        Ok(EncodedMessage {
            message_type,
            packed,
            components: MessageSummary::from_packets(message_type, &unpacked),
            unpacked,
        })
    }

    fn verify_signature(&self, packet: &SignedPacket, key: &VerificationKey) -> bool {
        packet.verify(key)
    }
}

#[cfg(test)]
mod tests {
    use shuffle_proto::{MessageType, ProtocolError, SessionId};

    use super::*;
    use crate::message::{BroadcastParams, RegistrationParams};

    fn codec() -> CborCodec {
        CborCodec::new(SigningKey::from_bytes(&[7; 32]))
    }

    fn broadcast() -> OutboundMessage {
        OutboundMessage::Broadcast(BroadcastParams {
            session: SessionId::new(vec![1, 2, 3]),
            number: 2,
            addresses: vec!["qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a".into()],
        })
    }

    #[test]
    fn encoded_frame_decodes_to_same_message() {
        let codec = codec();
        let encoded = codec.encode(&broadcast()).unwrap();

        let classified = codec.decode_and_classify(&encoded.packed).unwrap();

        assert_eq!(classified.message_type(), MessageType::Broadcast);
        assert_eq!(classified.full(), &encoded.unpacked);
        assert_eq!(classified.summary(), &encoded.components);
    }

    #[test]
    fn signs_everything_but_registration() {
        let codec = codec();

        let signed = codec.encode(&broadcast()).unwrap();
        let packet = &signed.unpacked.packets[0];
        assert!(codec.verify_signature(packet, &codec.verification_key()));

        let registration = codec
            .encode(&OutboundMessage::Registration(RegistrationParams { version: 1, amount: 1000 }))
            .unwrap();
        assert_eq!(registration.unpacked.packets[0].signature, None);
    }

    #[test]
    fn invalid_params_never_encode() {
        let message = OutboundMessage::Broadcast(BroadcastParams {
            session: SessionId::new(vec![1]),
            number: 2,
            addresses: vec![],
        });
        assert!(matches!(codec().encode(&message), Err(EncodeError::InvalidParams { .. })));
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        let codec = codec();

        assert_eq!(
            codec.decode_and_classify(b"nope"),
            Err(DecodeError::Protocol(ProtocolError::FrameTooShort { expected: 12, actual: 4 }))
        );

        let garbage = Frame::new(vec![0xff, 0x00, 0x13]).to_bytes().unwrap();
        assert!(matches!(
            codec.decode_and_classify(&garbage),
            Err(DecodeError::Protocol(ProtocolError::CborDecode(_)))
        ));

        let empty = Packets::default().to_frame().unwrap().to_bytes().unwrap();
        assert_eq!(codec.decode_and_classify(&empty), Err(DecodeError::Empty));
    }

    #[test]
    fn bundle_followed_by_junk_is_malformed() {
        let codec = codec();
        let encoded = codec.encode(&broadcast()).unwrap();
        let mut payload = encoded.unpacked.to_cbor().unwrap();
        payload.extend_from_slice(b"\xff\xff GARBAGE TRAILER");
        let frame = Frame::new(payload).to_bytes().unwrap();

        assert!(matches!(
            codec.decode_and_classify(&frame),
            Err(DecodeError::Protocol(ProtocolError::CborDecode(_)))
        ));
    }

    #[test]
    fn frame_limit_applies_before_payload_decode() {
        let codec = codec().with_max_frame_size(8);
        let encoded = self::codec().encode(&broadcast()).unwrap();

        assert!(matches!(
            codec.decode_and_classify(&encoded.packed),
            Err(DecodeError::TooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn configured_frame_limit_reaches_the_codec() {
        let config = ChannelConfig { max_frame_size: 8, ..ChannelConfig::default() };
        let codec = CborCodec::from_config(SigningKey::from_bytes(&[3; 32]), &config);
        let encoded = self::codec().encode(&broadcast()).unwrap();

        assert!(matches!(
            codec.decode_and_classify(&encoded.packed),
            Err(DecodeError::TooLarge { max: 8, .. })
        ));
    }
}
