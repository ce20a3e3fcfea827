use crate::domain::coordination::{RoundPhase, RoundTimingConfig};
use crate::foundation::RoundId;

/// Maps wall-clock time onto the logical round counter: `round = (now - epoch) / duration`.
#[derive(Clone, Debug)]
pub struct RoundClock {
    config: RoundTimingConfig,
}

/// Absolute deadlines for negotiating one round. Every peer derives the same values from the round id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundSchedule {
    pub round_id: RoundId,
    pub negotiation_start_ns: u64,
    pub proposing_end_ns: u64,
    pub selecting_end_ns: u64,
    /// Last moment a late proposal may replace a fallback winner.
    pub grace_end_ns: u64,
    /// Content must be realized by now; spans the rest of the negotiation round plus one full round.
    pub fetch_deadline_ns: u64,
    /// Wall-clock slot in which the round nominally plays.
    pub playback_start_ns: u64,
}

impl RoundSchedule {
    /// Phase the round should be in at `now_ns` if everything goes to plan.
    pub fn expected_phase(&self, now_ns: u64) -> RoundPhase {
        if now_ns < self.proposing_end_ns {
            RoundPhase::Proposing
        } else if now_ns < self.selecting_end_ns {
            RoundPhase::Selecting
        } else if now_ns < self.fetch_deadline_ns {
            RoundPhase::Fetching
        } else {
            RoundPhase::Resolved
        }
    }
}

impl RoundClock {
    pub fn new(config: RoundTimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoundTimingConfig {
        &self.config
    }

    pub fn round_duration_ns(&self) -> u64 {
        self.config.round_duration_ns.max(1)
    }

    pub fn current_round(&self, now_ns: u64) -> RoundId {
        now_ns.saturating_sub(self.config.epoch_ns) / self.round_duration_ns()
    }

    pub fn round_start(&self, round_id: RoundId) -> u64 {
        self.config.epoch_ns.saturating_add(round_id.saturating_mul(self.round_duration_ns()))
    }

    /// Newest round whose negotiation has started at `now_ns`.
    pub fn newest_open_round(&self, now_ns: u64) -> RoundId {
        self.current_round(now_ns).saturating_add(self.config.lead_rounds())
    }

    pub fn schedule(&self, round_id: RoundId) -> RoundSchedule {
        let duration = self.round_duration_ns();
        let start = self.round_start(round_id.saturating_sub(self.config.lead_rounds()));
        let proposing_end = start.saturating_add(pct_of(duration, self.config.proposing_pct));
        let selecting_end = proposing_end.saturating_add(pct_of(duration, self.config.selecting_pct));
        let fetch_deadline = start.saturating_add(duration.saturating_mul(2));
        let grace_end = selecting_end.saturating_add(self.config.grace_period_ns).min(fetch_deadline);
        RoundSchedule {
            round_id,
            negotiation_start_ns: start,
            proposing_end_ns: proposing_end,
            selecting_end_ns: selecting_end,
            grace_end_ns: grace_end,
            fetch_deadline_ns: fetch_deadline,
            playback_start_ns: self.round_start(round_id),
        }
    }
}

fn pct_of(value: u64, pct: u8) -> u64 {
    ((value as u128) * u128::from(pct) / 100) as u64
}
