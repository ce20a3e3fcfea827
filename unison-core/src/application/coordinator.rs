//! Round coordinator: drives every open round through its phases and feeds the lookahead queue.
//!
//! The coordinator performs no I/O. The runtime calls [`RoundCoordinator::tick`] on a timer
//! and forwards inbound proposals and realization results; the returned
//! [`CoordinatorAction`]s tell it what to build, fetch and persist.

use crate::domain::coordination::{
    canonical_candidates, select, AcceptOutcome, LookaheadQueue, Proposal, QueueSnapshot, ResolvedRound, Round, RoundClock,
    RoundPhase, RoundSchedule, RoundTimingConfig,
};
use crate::foundation::{ContentId, PeerId, ProposalHash, RoundId, UnisonError};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub timing: RoundTimingConfig,
    pub history_limit: usize,
    pub max_early_proposals: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinatorAction {
    /// Build a local proposal for the round. When `broadcast` is false the round's proposing
    /// window already passed and the proposal only serves as the local fallback.
    NeedLocalProposal { round_id: RoundId, broadcast: bool },
    /// Pin the winner's content before `deadline_ns` and report back via `on_realization`.
    StartRealization { round_id: RoundId, content_ids: Vec<ContentId>, deadline_ns: u64 },
    RoundResolved(Arc<ResolvedRound>),
}

struct ActiveRound {
    round: Round,
    schedule: RoundSchedule,
    local: Option<Proposal>,
    broadcast_local: bool,
    consensus_hash: Option<ProposalHash>,
    candidate_count: usize,
}

pub struct RoundCoordinator {
    clock: RoundClock,
    config: CoordinatorConfig,
    queue: LookaheadQueue,
    active: BTreeMap<RoundId, ActiveRound>,
    early: BTreeMap<RoundId, Vec<Proposal>>,
    history: VecDeque<Arc<ResolvedRound>>,
    excluded: HashSet<PeerId>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
}

impl RoundCoordinator {
    /// Starts with the queue head at the current wall-clock round. `history` (oldest first)
    /// refills queue slots for rounds resolved before a restart.
    pub fn new(config: CoordinatorConfig, now_ns: u64, history: Vec<ResolvedRound>) -> Self {
        let clock = RoundClock::new(config.timing.clone());
        let head = clock.current_round(now_ns);
        let queue = LookaheadQueue::new(head, config.timing.queue_depth);
        let (snapshot_tx, _) = watch::channel(queue.snapshot());
        let mut coordinator = Self {
            clock,
            config,
            queue,
            active: BTreeMap::new(),
            early: BTreeMap::new(),
            history: VecDeque::new(),
            excluded: HashSet::new(),
            snapshot_tx,
        };
        let mut history = history;
        history.sort_by_key(|r| r.round_id);
        for round in history {
            coordinator.remember(Arc::new(round));
        }
        coordinator.refill_from_history();
        coordinator.publish_snapshot();
        info!(
            "coordinator: started head={} depth={} lead_rounds={} restored_history={}",
            head,
            coordinator.queue.depth(),
            coordinator.clock.config().lead_rounds(),
            coordinator.history.len()
        );
        coordinator
    }

    pub fn clock(&self) -> &RoundClock {
        &self.clock
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Queue snapshot carrying the lengths of remembered rounds older than the head.
    pub fn snapshot(&self) -> QueueSnapshot {
        let head = self.queue.head();
        let mut snapshot = self.queue.snapshot();
        snapshot.departed =
            self.history.iter().take_while(|r| r.round_id < head).map(|r| (r.round_id, r.segments().len())).collect();
        snapshot
    }

    pub fn history(&self) -> Vec<ResolvedRound> {
        self.history.iter().map(|r| r.as_ref().clone()).collect()
    }

    pub fn resolved_round(&self, round_id: RoundId) -> Option<Arc<ResolvedRound>> {
        self.history.iter().find(|r| r.round_id == round_id).cloned()
    }

    pub fn active_rounds(&self) -> impl Iterator<Item = RoundId> + '_ {
        self.active.keys().copied()
    }

    pub fn round_phase(&self, round_id: RoundId) -> Option<RoundPhase> {
        match self.active.get(&round_id) {
            Some(active) => Some(active.round.phase),
            None => self.resolved_round(round_id).map(|_| RoundPhase::Resolved),
        }
    }

    pub fn set_excluded(&mut self, excluded: HashSet<PeerId>) {
        if excluded != self.excluded {
            info!("coordinator: excluded peers updated count={}", excluded.len());
        }
        self.excluded = excluded;
    }

    /// Advances every round whose deadlines have passed and opens rounds whose negotiation started.
    pub fn tick(&mut self, now_ns: u64) -> Vec<CoordinatorAction> {
        let mut actions = Vec::new();
        self.catch_up_with_clock(now_ns);
        let opened = self.open_rounds(now_ns, &mut actions);

        // Freshly opened rounds wait one tick so the runtime can submit the local proposal first.
        let round_ids: Vec<RoundId> = self.active.keys().copied().filter(|id| !opened.contains(id)).collect();
        for round_id in round_ids {
            self.step_round(round_id, now_ns, &mut actions);
        }
        actions
    }

    /// Validates and records a peer proposal. Proposals for rounds not yet open are buffered.
    pub fn on_proposal(&mut self, proposal: Proposal, now_ns: u64) -> Result<AcceptOutcome, UnisonError> {
        proposal.validate()?;
        let round_id = proposal.round_id;
        if let Some(active) = self.active.get_mut(&round_id) {
            let outcome = active.round.accept_proposal(proposal);
            trace!("coordinator: proposal round_id={} outcome={:?} phase={}", round_id, outcome, active.round.phase);
            return Ok(outcome);
        }
        if round_id < self.queue.head() || self.resolved_round(round_id).is_some() {
            return Ok(AcceptOutcome::PhaseClosed);
        }
        let horizon = self.clock.newest_open_round(now_ns).saturating_add(self.queue.depth() as u64);
        let buffered: usize = self.early.values().map(Vec::len).sum();
        if round_id > horizon || buffered >= self.config.max_early_proposals {
            debug!("coordinator: early proposal dropped round_id={} horizon={} buffered={}", round_id, horizon, buffered);
            return Ok(AcceptOutcome::PhaseClosed);
        }
        let pending = self.early.entry(round_id).or_default();
        if pending.iter().any(|p| p.proposal_hash == proposal.proposal_hash) {
            return Ok(AcceptOutcome::DuplicateDropped);
        }
        pending.push(proposal);
        Ok(AcceptOutcome::Accepted)
    }

    /// Installs the locally built proposal. Returns true when it should be broadcast to peers.
    pub fn submit_local_proposal(&mut self, proposal: Proposal) -> Result<bool, UnisonError> {
        proposal.validate()?;
        let round_id = proposal.round_id;
        let Some(active) = self.active.get_mut(&round_id) else {
            debug!("coordinator: local proposal for inactive round dropped round_id={}", round_id);
            return Ok(false);
        };
        active.local = Some(proposal.clone());
        if active.round.awaiting_late && !active.round.is_fallback {
            active.round.set_fallback(proposal.clone())?;
            info!("coordinator: fallback installed round_id={} proposal_hash={}", round_id, proposal.proposal_hash);
        }
        if !active.broadcast_local {
            return Ok(false);
        }
        Ok(active.round.accept_proposal(proposal).is_accepted())
    }

    /// Reports the outcome of pinning a round's winner. Late results for rounds no longer
    /// in `Fetching` are discarded.
    pub fn on_realization(&mut self, round_id: RoundId, result: Result<(), UnisonError>, now_ns: u64) -> Vec<CoordinatorAction> {
        let mut actions = Vec::new();
        let Some(active) = self.active.get_mut(&round_id) else {
            debug!("coordinator: realization result for inactive round discarded round_id={}", round_id);
            return actions;
        };
        if active.round.phase != RoundPhase::Fetching {
            return actions;
        }
        if let Err(err) = result {
            warn!("coordinator: realization failed round_id={} code={:?} error={}", round_id, err.code(), err);
            Self::demote(active);
        }
        self.resolve(round_id, now_ns, &mut actions);
        actions
    }

    /// Called when playback enters `round_id`; slides the queue so it becomes the head.
    pub fn on_playback_round(&mut self, round_id: RoundId) {
        if round_id <= self.queue.head() {
            return;
        }
        let appended = self.queue.advance_to(round_id);
        debug!("coordinator: queue advanced head={} appended={:?}", self.queue.head(), appended);
        self.refill_from_history();
        self.abandon_stale_rounds();
        self.publish_snapshot();
    }

    fn catch_up_with_clock(&mut self, now_ns: u64) {
        let current = self.clock.current_round(now_ns);
        if current > self.queue.tail() {
            warn!("coordinator: playback fell behind the clock head={} clock_round={}; jumping", self.queue.head(), current);
            self.on_playback_round(current);
        }
    }

    fn open_rounds(&mut self, now_ns: u64, actions: &mut Vec<CoordinatorAction>) -> Vec<RoundId> {
        let mut opened = Vec::new();
        let newest = self.clock.newest_open_round(now_ns);
        for round_id in self.queue.head()..=newest {
            if self.active.contains_key(&round_id) || self.resolved_round(round_id).is_some() {
                continue;
            }
            let schedule = self.clock.schedule(round_id);
            if now_ns < schedule.negotiation_start_ns {
                continue;
            }
            let broadcast = now_ns < schedule.proposing_end_ns;
            let mut round = Round::new(round_id, now_ns);
            for proposal in self.early.remove(&round_id).unwrap_or_default() {
                round.accept_proposal(proposal);
            }
            if broadcast {
                debug!("coordinator: round opened round_id={} buffered={}", round_id, round.proposals.len());
            } else {
                info!("coordinator: joined round after its proposing window round_id={} received={}", round_id, round.proposals.len());
            }
            self.active.insert(
                round_id,
                ActiveRound { round, schedule, local: None, broadcast_local: broadcast, consensus_hash: None, candidate_count: 0 },
            );
            actions.push(CoordinatorAction::NeedLocalProposal { round_id, broadcast });
            opened.push(round_id);
        }
        opened
    }

    fn step_round(&mut self, round_id: RoundId, now_ns: u64, actions: &mut Vec<CoordinatorAction>) {
        let excluded = &self.excluded;
        let Some(active) = self.active.get_mut(&round_id) else { return };
        let schedule = active.schedule;

        if active.round.phase == RoundPhase::Proposing && now_ns >= schedule.proposing_end_ns {
            if let Err(err) = active.round.transition(RoundPhase::Selecting, now_ns) {
                warn!("coordinator: transition failed round_id={} error={}", round_id, err);
                return;
            }
            trace!("coordinator: selecting round_id={} proposals={}", round_id, active.round.proposals.len());
        }

        if active.round.phase == RoundPhase::Selecting {
            let selection_due = now_ns >= schedule.selecting_end_ns;
            let first_attempt = !active.round.awaiting_late;
            if selection_due && (first_attempt || now_ns < schedule.grace_end_ns) {
                if let Some(action) = Self::try_select(active, excluded, now_ns) {
                    actions.push(action);
                    return;
                }
            }
            if active.round.awaiting_late && now_ns >= schedule.grace_end_ns {
                info!(
                    "coordinator: grace period over, resolving with fallback round_id={} has_local={}",
                    round_id,
                    active.round.winner.is_some()
                );
                self.resolve(round_id, now_ns, actions);
            }
            return;
        }

        if active.round.phase == RoundPhase::Fetching && now_ns >= schedule.fetch_deadline_ns {
            let content_id = active.round.winner.as_ref().and_then(|w| w.segments.first()).map(|s| s.content_id.to_string());
            let err = UnisonError::FetchTimeout { round_id, content_id: content_id.unwrap_or_default() };
            warn!("coordinator: {} (hard deadline)", err);
            Self::demote(active);
            self.resolve(round_id, now_ns, actions);
        }
    }

    /// Runs the selector over the round's candidates. On an empty set the round is left
    /// waiting for late proposals with the local proposal as provisional winner.
    fn try_select(active: &mut ActiveRound, excluded: &HashSet<PeerId>, now_ns: u64) -> Option<CoordinatorAction> {
        let round_id = active.round.round_id;
        let candidates = canonical_candidates(active.round.proposals.iter(), excluded);
        let selection = match select(round_id, &candidates) {
            Ok(selection) => selection,
            Err(err) => {
                if !active.round.awaiting_late {
                    warn!("coordinator: {} received={} excluded={}", err, active.round.proposals.len(), excluded.len());
                    if let Err(err) = active.round.mark_no_candidates() {
                        warn!("coordinator: cannot wait for late proposals round_id={} error={}", round_id, err);
                    }
                    if let Some(local) = active.local.clone() {
                        if let Err(err) = active.round.set_fallback(local) {
                            warn!("coordinator: fallback rejected round_id={} error={}", round_id, err);
                        }
                    }
                }
                return None;
            }
        };
        let winner = selection.winner.clone();
        info!(
            "coordinator: winner selected round_id={} winner_peer={} proposal_hash={} index={} candidates={} late={}",
            round_id,
            winner.peer_id,
            winner.proposal_hash,
            selection.index,
            selection.candidate_count,
            active.round.awaiting_late
        );
        active.consensus_hash = Some(winner.proposal_hash);
        active.candidate_count = selection.candidate_count;
        let content_ids = winner.content_ids();
        if let Err(err) = active.round.set_winner(winner, now_ns) {
            warn!("coordinator: cannot store winner round_id={} error={}", round_id, err);
            return None;
        }
        Some(CoordinatorAction::StartRealization { round_id, content_ids, deadline_ns: active.schedule.fetch_deadline_ns })
    }

    fn demote(active: &mut ActiveRound) {
        let Some(local) = active.local.clone() else {
            warn!("coordinator: no local alternative, keeping unrealized winner round_id={}", active.round.round_id);
            return;
        };
        if active.round.winner.as_ref().is_some_and(|w| w.proposal_hash == local.proposal_hash) {
            return;
        }
        match active.round.demote_to_fallback(local) {
            Ok(()) => info!("coordinator: round demoted to local fallback round_id={}", active.round.round_id),
            Err(err) => warn!("coordinator: demotion failed round_id={} error={}", active.round.round_id, err),
        }
    }

    fn resolve(&mut self, round_id: RoundId, now_ns: u64, actions: &mut Vec<CoordinatorAction>) {
        let Some(mut active) = self.active.remove(&round_id) else { return };
        if let Err(err) = active.round.transition(RoundPhase::Resolved, now_ns) {
            warn!("coordinator: cannot resolve round_id={} error={}", round_id, err);
            return;
        }
        let resolved = Arc::new(ResolvedRound {
            round_id,
            winner: active.round.winner.take(),
            consensus_hash: active.consensus_hash,
            is_fallback: active.round.is_fallback,
            candidate_count: active.candidate_count,
            resolved_at_ns: now_ns,
        });
        info!(
            "coordinator: round resolved round_id={} fallback={} segments={} playing_hash={}",
            round_id,
            resolved.is_fallback,
            resolved.segments().len(),
            resolved.playing_hash().map(|h| h.to_string()).unwrap_or_else(|| "-".to_string())
        );
        self.remember(resolved.clone());
        if self.queue.fill(resolved.clone()) {
            self.publish_snapshot();
        }
        actions.push(CoordinatorAction::RoundResolved(resolved));
    }

    fn remember(&mut self, round: Arc<ResolvedRound>) {
        let position = self.history.iter().position(|r| r.round_id >= round.round_id).unwrap_or(self.history.len());
        if self.history.get(position).is_some_and(|r| r.round_id == round.round_id) {
            self.history[position] = round;
        } else {
            self.history.insert(position, round);
        }
        while self.history.len() > self.config.history_limit.max(1) {
            self.history.pop_front();
        }
    }

    fn refill_from_history(&mut self) {
        let pending: Vec<RoundId> = self.queue.unresolved().collect();
        for round_id in pending {
            if let Some(round) = self.resolved_round(round_id) {
                self.queue.fill(round);
            }
        }
    }

    fn abandon_stale_rounds(&mut self) {
        let head = self.queue.head();
        let stale: Vec<RoundId> = self.active.range(..head).map(|(id, _)| *id).collect();
        for round_id in stale {
            if let Some(active) = self.active.remove(&round_id) {
                info!("coordinator: round abandoned round_id={} phase={}", round_id, active.round.phase);
            }
        }
        self.early.retain(|round_id, _| *round_id >= head);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
