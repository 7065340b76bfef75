//! Participants and packet builders for tests.

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use shuffle_core::roster::{Player, StaticRoster};
use shuffle_proto::{
    Packet, PacketBody, Packets, Phase, ProtocolError, SessionId, Signature, SignedPacket,
    VerificationKey,
};

/// Session every fixture packet belongs to
pub const SESSION: &[u8] = b"sim-session";

/// A simulated participant with a deterministic key
#[derive(Clone)]
pub struct Participant {
    signing_key: SigningKey,
    player: Player,
}

impl Participant {
    /// Participant `number`, keyed from `number` so runs are reproducible
    pub fn new(number: u32) -> Self {
        let mut seed = [0x5f; 32];
        seed[..4].copy_from_slice(&number.to_be_bytes());
        let signing_key = SigningKey::from_bytes(&seed);

        let player = Player {
            verification_key: VerificationKey::from_signing_key(&signing_key),
            session_label: format!("player-{number}"),
            player_number: number,
        };
        Self { signing_key, player }
    }

    /// Roster entry for this participant
    pub fn player(&self) -> &Player {
        &self.player
    }

    /// Verification key
    pub fn key(&self) -> VerificationKey {
        self.player.verification_key
    }

    /// Signing key, for building codecs
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Unsigned packet from this participant
    pub fn packet(&self, phase: Phase, body: PacketBody) -> Packet {
        Packet {
            session: SessionId::new(SESSION.to_vec()),
            number: self.player.player_number,
            from_key: self.key(),
            to_key: None,
            phase,
            body,
        }
    }

    /// Correctly signed packet
    pub fn signed(&self, phase: Phase, body: PacketBody) -> Result<SignedPacket, ProtocolError> {
        SignedPacket::sign(self.packet(phase, body), &self.signing_key)
    }

    /// Packet claiming to be from this participant with a signature that
    /// does not verify
    pub fn forged(&self, phase: Phase, body: PacketBody) -> SignedPacket {
        SignedPacket {
            packet: self.packet(phase, body),
            signature: Some(Signature::from_bytes([0xa5; 64])),
        }
    }

    /// Encryption-key announcement, signed
    pub fn announcement(&self) -> Result<SignedPacket, ProtocolError> {
        let key = format!("02{:064x}", self.player.player_number);
        self.signed(Phase::Announcement, PacketBody::EncryptionKey { key })
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant").field("player", &self.player).finish_non_exhaustive()
    }
}

/// Roster containing `participants`
pub fn roster_of(participants: &[Participant]) -> StaticRoster {
    StaticRoster::new(participants.iter().map(|p| p.player.clone()).collect())
}

/// Encode sub-packets into one complete frame
pub fn frame_of(packets: Vec<SignedPacket>) -> Result<Bytes, ProtocolError> {
    Packets::new(packets).to_frame()?.to_bytes()
}
