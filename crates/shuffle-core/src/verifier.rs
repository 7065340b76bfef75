//! Per-sub-packet signature verdicts.
//!
//! A frame may bundle contributions from several participants, so every
//! signed sub-packet is judged on its own. An unknown signer is a failure,
//! not a lookup error: the key is reported as the culprit and the signature
//! primitive is never called.

use shuffle_proto::SignedPacket;

use crate::{
    codec::MessageCodec,
    event::Culprit,
    roster::{Player, Roster},
};

/// Outcome of checking one sub-packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No signature; accepted as-is
    Unsigned,
    /// Signature verified under a known player's key
    Verified(Player),
    /// Signer unknown or signature invalid
    Rejected(Culprit),
}

impl Verdict {
    /// True unless the sub-packet was rejected
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Judge one sub-packet against the roster.
pub fn check_sub_packet<C, R>(codec: &C, roster: &R, sub_packet: &SignedPacket) -> Verdict
where
    C: MessageCodec + ?Sized,
    R: Roster + ?Sized,
{
    let Some(signer) = sub_packet.signer() else {
        return Verdict::Unsigned;
    };

    let Some(player) = roster.find_player(signer) else {
        tracing::debug!(signer = %signer, "Signer not on roster");
        return Verdict::Rejected(Culprit::Unknown { key: *signer });
    };

    if codec.verify_signature(sub_packet, &player.verification_key) {
        Verdict::Verified(player)
    } else {
        tracing::debug!(signer = %signer, player = player.player_number, "Signature does not verify");
        Verdict::Rejected(Culprit::Player(player))
    }
}
