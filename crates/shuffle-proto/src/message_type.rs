//! Message types and protocol phases.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Phase of a shuffle round, as stamped on each packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Outside any round (registration, pool notices)
    #[default]
    None,
    /// Participants announce their encryption keys
    Announcement,
    /// Layered-encrypted outputs are shuffled along the player chain
    Shuffle,
    /// Last player broadcasts the final output list
    Broadcast,
    /// Participants cross-check what they were shown
    EquivocationCheck,
    /// Participants sign the joint transaction
    Signing,
    /// Signed transaction is verified and submitted
    VerificationAndSubmission,
    /// A participant is being accused
    Blame,
}

/// Classification of a protocol message
///
/// Closed set: the channel buckets its audit log by this type and the round
/// logic dispatches on it. Serialized in camelCase (`"playerCount"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Client asks to join a pool
    Registration,
    /// Server confirms registration and assigns a player number
    Registered,
    /// Server reports how many players are waiting
    PlayerCount,
    /// Encryption key announcement
    Announcement,
    /// Shuffled ciphertexts
    Shuffle,
    /// Final output addresses
    Broadcast,
    /// Equivocation-check hash
    EquivocationCheck,
    /// Transaction input signatures
    Signing,
    /// Accusation against a participant
    Blame,
    /// Free-form server notice
    Notice,
}

impl MessageType {
    /// Every message type, in declaration order
    pub const ALL: [Self; 10] = [
        Self::Registration,
        Self::Registered,
        Self::PlayerCount,
        Self::Announcement,
        Self::Shuffle,
        Self::Broadcast,
        Self::EquivocationCheck,
        Self::Signing,
        Self::Blame,
        Self::Notice,
    ];

    /// Wire name of this type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Registered => "registered",
            Self::PlayerCount => "playerCount",
            Self::Announcement => "announcement",
            Self::Shuffle => "shuffle",
            Self::Broadcast => "broadcast",
            Self::EquivocationCheck => "equivocationCheck",
            Self::Signing => "signing",
            Self::Blame => "blame",
            Self::Notice => "notice",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for ty in MessageType::ALL {
            assert_eq!(ty.as_str().parse::<MessageType>(), Ok(ty));
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert_eq!(
            "round3".parse::<MessageType>(),
            Err(ProtocolError::UnknownMessageType("round3".into()))
        );
    }

    #[test]
    fn serde_name_matches_wire_name() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&MessageType::EquivocationCheck, &mut buf).unwrap();
        let name: String = ciborium::de::from_reader(buf.as_slice()).unwrap();
        assert_eq!(name, MessageType::EquivocationCheck.as_str());
    }
}
