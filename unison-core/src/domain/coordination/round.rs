use crate::domain::coordination::{Proposal, RoundPhase};
use crate::foundation::{RoundId, UnisonError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// The peer was already represented by a later-timestamped proposal, which was replaced.
    ReplacedLater,
    DuplicateDropped,
    PhaseClosed,
    RoundMismatch,
}

impl AcceptOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, AcceptOutcome::Accepted | AcceptOutcome::ReplacedLater)
    }
}

/// One unit of consensus. Only the coordinator mutates a round, and never after `Resolved`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Round {
    pub round_id: RoundId,
    pub phase: RoundPhase,
    pub phase_started_at_ns: u64,
    /// At most one proposal per peer, in arrival order.
    pub proposals: Vec<Proposal>,
    pub winner: Option<Proposal>,
    pub is_fallback: bool,
    /// Selection found no candidates; late proposals are admitted until the grace period ends.
    #[serde(default)]
    pub awaiting_late: bool,
}

impl Round {
    pub fn new(round_id: RoundId, now_ns: u64) -> Self {
        Self {
            round_id,
            phase: RoundPhase::Proposing,
            phase_started_at_ns: now_ns,
            proposals: Vec::new(),
            winner: None,
            is_fallback: false,
            awaiting_late: false,
        }
    }

    /// Collects a proposal while `Proposing`, or while an empty selection is still waiting in `Selecting`.
    pub fn accept_proposal(&mut self, proposal: Proposal) -> AcceptOutcome {
        if proposal.round_id != self.round_id {
            return AcceptOutcome::RoundMismatch;
        }
        let open = match self.phase {
            RoundPhase::Proposing => true,
            RoundPhase::Selecting => self.awaiting_late,
            RoundPhase::Fetching | RoundPhase::Resolved => false,
        };
        if !open {
            return AcceptOutcome::PhaseClosed;
        }

        match self.proposals.iter_mut().find(|p| p.peer_id == proposal.peer_id) {
            Some(existing) if proposal.timestamp_ns < existing.timestamp_ns => {
                *existing = proposal;
                AcceptOutcome::ReplacedLater
            }
            Some(_) => AcceptOutcome::DuplicateDropped,
            None => {
                self.proposals.push(proposal);
                AcceptOutcome::Accepted
            }
        }
    }

    pub fn transition(&mut self, target: RoundPhase, now_ns: u64) -> Result<(), UnisonError> {
        if !self.phase.can_transition_to(target) {
            return Err(UnisonError::InvalidStateTransition { from: self.phase.to_string(), to: target.to_string() });
        }
        self.phase = target;
        self.phase_started_at_ns = now_ns;
        Ok(())
    }

    /// Stores the selector's winner and moves to `Fetching`.
    pub fn set_winner(&mut self, winner: Proposal, now_ns: u64) -> Result<(), UnisonError> {
        self.transition(RoundPhase::Fetching, now_ns)?;
        self.winner = Some(winner);
        self.is_fallback = false;
        self.awaiting_late = false;
        Ok(())
    }

    /// Records an empty selection. The round stays in `Selecting` and reopens for late proposals.
    pub fn mark_no_candidates(&mut self) -> Result<(), UnisonError> {
        if self.phase != RoundPhase::Selecting {
            return Err(UnisonError::InvalidStateTransition { from: self.phase.to_string(), to: "awaiting_late".to_string() });
        }
        self.awaiting_late = true;
        Ok(())
    }

    /// Installs a provisional local winner. The round stays in `Selecting` so a late proposal can still win.
    pub fn set_fallback(&mut self, fallback: Proposal) -> Result<(), UnisonError> {
        if self.phase != RoundPhase::Selecting {
            return Err(UnisonError::InvalidStateTransition { from: self.phase.to_string(), to: "fallback".to_string() });
        }
        self.winner = Some(fallback);
        self.is_fallback = true;
        self.awaiting_late = true;
        Ok(())
    }

    /// Replaces the winner with locally realizable content after a fetch failure.
    pub fn demote_to_fallback(&mut self, fallback: Proposal) -> Result<(), UnisonError> {
        if self.phase != RoundPhase::Fetching {
            return Err(UnisonError::InvalidStateTransition { from: self.phase.to_string(), to: "fallback".to_string() });
        }
        self.winner = Some(fallback);
        self.is_fallback = true;
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.phase.is_terminal()
    }
}
