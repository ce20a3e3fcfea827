use crate::foundation::constants::{DEFAULT_QUEUE_DEPTH, NANOS_PER_SECOND};
use crate::foundation::UnisonError;
use serde::{Deserialize, Serialize};

pub const MIN_QUEUE_DEPTH: usize = 3;
pub const DEFAULT_ROUND_DURATION_SECS: u64 = 180;
pub const DEFAULT_PROPOSING_PCT: u8 = 25;
pub const DEFAULT_SELECTING_PCT: u8 = 40;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;
pub const DEFAULT_HISTORY_LIMIT: usize = 64;
pub const DEFAULT_MAX_EARLY_PROPOSALS: usize = 256;

/// Round timing shared by every peer. Peers with different values will not agree on schedules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTimingConfig {
    pub epoch_ns: u64,
    pub round_duration_ns: u64,
    pub queue_depth: usize,
    pub proposing_pct: u8,
    pub selecting_pct: u8,
    pub grace_period_ns: u64,
}

impl Default for RoundTimingConfig {
    fn default() -> Self {
        Self {
            epoch_ns: 0,
            round_duration_ns: DEFAULT_ROUND_DURATION_SECS * NANOS_PER_SECOND,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            proposing_pct: DEFAULT_PROPOSING_PCT,
            selecting_pct: DEFAULT_SELECTING_PCT,
            grace_period_ns: DEFAULT_GRACE_PERIOD_SECS * NANOS_PER_SECOND,
        }
    }
}

impl RoundTimingConfig {
    /// How many rounds ahead of the round being played negotiation starts.
    ///
    /// Two slots of the queue are kept for playback (current and next); the rest are lookahead.
    pub fn lead_rounds(&self) -> u64 {
        self.queue_depth.saturating_sub(2).max(1) as u64
    }

    pub fn validate(&self) -> Result<(), UnisonError> {
        if self.round_duration_ns == 0 {
            return Err(UnisonError::ConfigError("round_duration must be > 0".to_string()));
        }
        if self.queue_depth < MIN_QUEUE_DEPTH {
            return Err(UnisonError::ConfigError(format!("queue_depth must be >= {MIN_QUEUE_DEPTH}")));
        }
        if self.proposing_pct == 0 || self.selecting_pct == 0 {
            return Err(UnisonError::ConfigError("phase percentages must be > 0".to_string()));
        }
        if u16::from(self.proposing_pct) + u16::from(self.selecting_pct) >= 100 {
            return Err(UnisonError::ConfigError("proposing_pct + selecting_pct must be < 100".to_string()));
        }
        Ok(())
    }
}
