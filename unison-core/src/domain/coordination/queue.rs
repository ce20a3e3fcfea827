use crate::domain::catalog::SegmentRef;
use crate::domain::coordination::Proposal;
use crate::foundation::{ProposalHash, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Immutable result of a round, shared read-only with the composer and pin manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRound {
    pub round_id: RoundId,
    /// Content actually queued for playback. `None` when no proposal or local content existed.
    pub winner: Option<Proposal>,
    /// Winner chosen by the selector, if selection ran with a non-empty candidate set.
    pub consensus_hash: Option<ProposalHash>,
    pub is_fallback: bool,
    pub candidate_count: usize,
    pub resolved_at_ns: u64,
}

impl ResolvedRound {
    pub fn segments(&self) -> &[SegmentRef] {
        self.winner.as_ref().map(|w| w.segments.as_slice()).unwrap_or_default()
    }

    pub fn playing_hash(&self) -> Option<ProposalHash> {
        self.winner.as_ref().map(|w| w.proposal_hash)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSlot {
    pub round_id: RoundId,
    pub resolved: Option<Arc<ResolvedRound>>,
}

/// Point-in-time copy of the queue handed to readers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current_round_id: RoundId,
    pub slots: Vec<QueueSlot>,
    /// Segment counts of resolved rounds that already left the queue, keyed by round.
    pub departed: BTreeMap<RoundId, usize>,
}

impl QueueSnapshot {
    pub fn get(&self, round_id: RoundId) -> Option<&QueueSlot> {
        self.slots.iter().find(|s| s.round_id == round_id)
    }

    /// Segment count of a resolved round, whether still queued or already departed.
    pub fn round_length(&self, round_id: RoundId) -> Option<usize> {
        match self.get(round_id).and_then(|slot| slot.resolved.as_ref()) {
            Some(round) => Some(round.segments().len()),
            None => self.departed.get(&round_id).copied(),
        }
    }

    /// Consecutive resolved rounds starting at `round_id`, stopping at the first unresolved slot.
    pub fn resolved_run_from(&self, round_id: RoundId) -> impl Iterator<Item = &Arc<ResolvedRound>> {
        self.slots.iter().skip_while(move |s| s.round_id < round_id).map_while(|s| s.resolved.as_ref())
    }
}

/// Fixed-depth window of rounds `[head, head + depth)`, never reordered.
#[derive(Clone, Debug)]
pub struct LookaheadQueue {
    depth: usize,
    slots: VecDeque<QueueSlot>,
}

impl LookaheadQueue {
    pub fn new(head: RoundId, depth: usize) -> Self {
        let depth = depth.max(1);
        let slots = (0..depth as u64).map(|offset| QueueSlot { round_id: head + offset, resolved: None }).collect();
        Self { depth, slots }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn head(&self) -> RoundId {
        self.slots.front().map(|s| s.round_id).unwrap_or_default()
    }

    pub fn tail(&self) -> RoundId {
        self.slots.back().map(|s| s.round_id).unwrap_or_default()
    }

    pub fn contains(&self, round_id: RoundId) -> bool {
        round_id >= self.head() && round_id <= self.tail()
    }

    pub fn is_resolved(&self, round_id: RoundId) -> bool {
        self.slots.iter().any(|s| s.round_id == round_id && s.resolved.is_some())
    }

    pub fn unresolved(&self) -> impl Iterator<Item = RoundId> + '_ {
        self.slots.iter().filter(|s| s.resolved.is_none()).map(|s| s.round_id)
    }

    /// Stores a resolved round in its slot. Returns false if the round is outside the queue or already filled.
    pub fn fill(&mut self, round: Arc<ResolvedRound>) -> bool {
        match self.slots.iter_mut().find(|s| s.round_id == round.round_id) {
            Some(slot) if slot.resolved.is_none() => {
                slot.resolved = Some(round);
                true
            }
            _ => false,
        }
    }

    /// Drops the head and appends a new empty round. Returns the appended round id.
    pub fn advance(&mut self) -> RoundId {
        let next = self.tail() + 1;
        self.slots.pop_front();
        self.slots.push_back(QueueSlot { round_id: next, resolved: None });
        next
    }

    /// Advances until `round_id` is the head. Returns the appended round ids.
    pub fn advance_to(&mut self, round_id: RoundId) -> Vec<RoundId> {
        let mut appended = Vec::new();
        if round_id > self.tail() {
            // Too far ahead to slide; rebuild around the new head.
            *self = LookaheadQueue::new(round_id, self.depth);
            appended.extend(self.slots.iter().map(|s| s.round_id));
            return appended;
        }
        while self.head() < round_id {
            appended.push(self.advance());
        }
        appended
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot { current_round_id: self.head(), slots: self.slots.iter().cloned().collect(), departed: BTreeMap::new() }
    }
}
