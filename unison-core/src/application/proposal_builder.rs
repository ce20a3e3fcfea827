use crate::application::catalog_source::CatalogSource;
use crate::domain::coordination::{build_proposal, Proposal, ProposalMode, ProposalRequest, ResolvedRound};
use crate::foundation::{RoundId, TrackId, UnisonError};
use log::debug;
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Turns the local catalog into one proposal per round, steering away from recent winners.
pub struct ProposalBuilder {
    catalog: Arc<dyn CatalogSource>,
    mode: ProposalMode,
    target_duration_ms: u64,
    avoid_limit: usize,
    recent: VecDeque<TrackId>,
}

impl ProposalBuilder {
    pub fn new(catalog: Arc<dyn CatalogSource>, mode: ProposalMode, target_duration_ms: u64, avoid_limit: usize) -> Self {
        Self { catalog, mode, target_duration_ms, avoid_limit, recent: VecDeque::new() }
    }

    pub fn build(&mut self, round_id: RoundId, now_ns: u64) -> Result<Proposal, UnisonError> {
        let pick = rand::thread_rng().gen::<usize>();
        self.build_with_pick(round_id, now_ns, pick)
    }

    pub fn build_with_pick(&mut self, round_id: RoundId, now_ns: u64, pick: usize) -> Result<Proposal, UnisonError> {
        let catalog = self.catalog.get_local_catalog()?;
        let avoid: HashSet<TrackId> = self.recent.iter().cloned().collect();
        let proposal = build_proposal(ProposalRequest {
            round_id,
            catalog: &catalog,
            mode: self.mode,
            target_duration_ms: self.target_duration_ms,
            avoid: &avoid,
            pick,
            now_ns,
        })?;
        debug!(
            "proposal_builder: built round_id={} mode={} tracks={} segments={} proposal_hash={}",
            round_id,
            self.mode,
            proposal.body.track_ids().len(),
            proposal.segments.len(),
            proposal.proposal_hash
        );
        Ok(proposal)
    }

    /// Remembers what a resolved round plays so the next proposals avoid repeating it.
    pub fn note_resolved(&mut self, round: &ResolvedRound) {
        let Some(winner) = round.winner.as_ref() else { return };
        for track_id in winner.body.track_ids() {
            self.recent.retain(|t| t != track_id);
            self.recent.push_back(track_id.clone());
        }
        while self.recent.len() > self.avoid_limit {
            self.recent.pop_front();
        }
    }

    pub fn recent_tracks(&self) -> impl Iterator<Item = &TrackId> {
        self.recent.iter()
    }
}
