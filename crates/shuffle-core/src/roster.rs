//! Roster boundary to the round state machine.
//!
//! The round logic owns the set of known participants. The channel only
//! asks two things of it: "who owns this key?" when checking signatures, and
//! "what does the round look like right now?" when building a debug dump.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use shuffle_proto::{Phase, VerificationKey};

/// A known participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Key the participant signs packets with
    pub verification_key: VerificationKey,
    /// Session label assigned by the server
    pub session_label: String,
    /// Position in the shuffle order
    pub player_number: u32,
}

/// Structural snapshot of the round, embedded in debug dumps
///
/// Every field is optional or empty-by-default so a round logic that tracks
/// less can still produce a dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Pool amount in satoshis
    pub amount: Option<u64>,
    /// Known participants
    pub players: Vec<Player>,
    /// Outputs after shuffling, if reached
    pub shuffled_outputs: Vec<String>,
    /// Change address, if any
    pub change_address: Option<String>,
    /// Anything else the round wants preserved
    pub extra: BTreeMap<String, String>,
}

/// Read-only view of the round's participants.
pub trait Roster {
    /// Participant whose verification key equals `key` exactly.
    fn find_player(&self, key: &VerificationKey) -> Option<Player>;

    /// Snapshot for debug dumps.
    fn snapshot(&self) -> RoundSnapshot;
}

impl<T: Roster + ?Sized> Roster for Arc<T> {
    fn find_player(&self, key: &VerificationKey) -> Option<Player> {
        (**self).find_player(key)
    }

    fn snapshot(&self) -> RoundSnapshot {
        (**self).snapshot()
    }
}

impl<T: Roster + ?Sized> Roster for &T {
    fn find_player(&self, key: &VerificationKey) -> Option<Player> {
        (**self).find_player(key)
    }

    fn snapshot(&self) -> RoundSnapshot {
        (**self).snapshot()
    }
}

/// Fixed roster, for clients whose participant set is known up front
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    snapshot: RoundSnapshot,
}

impl StaticRoster {
    /// Roster of `players` in phase [`Phase::None`]
    pub fn new(players: Vec<Player>) -> Self {
        Self { snapshot: RoundSnapshot { players, ..RoundSnapshot::default() } }
    }

    /// Roster built from a full snapshot
    pub fn from_snapshot(snapshot: RoundSnapshot) -> Self {
        Self { snapshot }
    }

    /// Known participants
    pub fn players(&self) -> &[Player] {
        &self.snapshot.players
    }
}

impl Roster for StaticRoster {
    fn find_player(&self, key: &VerificationKey) -> Option<Player> {
        self.snapshot.players.iter().find(|p| &p.verification_key == key).cloned()
    }

    fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.clone()
    }
}
