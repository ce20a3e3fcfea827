use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RoundPhase {
    #[default]
    Proposing = 0,
    Selecting = 1,
    Fetching = 2,
    Resolved = 3,
}

impl RoundPhase {
    /// Phases only move forward. `Selecting -> Resolved` covers a fallback round that hit its hard timeout.
    pub fn can_transition_to(self, target: RoundPhase) -> bool {
        use RoundPhase::*;
        matches!((self, target), (Proposing, Selecting) | (Selecting, Fetching) | (Selecting, Resolved) | (Fetching, Resolved))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoundPhase::Resolved)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Proposing => "proposing",
            RoundPhase::Selecting => "selecting",
            RoundPhase::Fetching => "fetching",
            RoundPhase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}
