use crate::domain::coordination::Proposal;
use crate::domain::hashes::{canonical_seed, seed_index};
use crate::foundation::{Hash32, PeerId, RoundId, TrackId, UnisonError};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub winner: &'a Proposal,
    pub index: usize,
    pub candidate_count: usize,
    pub seed: Hash32,
}

/// Reduces raw round proposals to the selector's candidate set, in canonical order.
///
/// - proposals from `excluded` peers are dropped
/// - one proposal per peer: earliest timestamp, then lowest hash
/// - one proposal per lead track: lowest hash
/// - sorted by `proposal_hash` ascending
pub fn canonical_candidates<'a, I>(proposals: I, excluded: &HashSet<PeerId>) -> Vec<&'a Proposal>
where
    I: IntoIterator<Item = &'a Proposal>,
{
    let mut by_peer: HashMap<&PeerId, &Proposal> = HashMap::new();
    for proposal in proposals {
        if excluded.contains(&proposal.peer_id) {
            continue;
        }
        by_peer
            .entry(&proposal.peer_id)
            .and_modify(|kept| {
                if (proposal.timestamp_ns, proposal.proposal_hash) < (kept.timestamp_ns, kept.proposal_hash) {
                    *kept = proposal;
                }
            })
            .or_insert(proposal);
    }

    let mut by_track: HashMap<Option<&TrackId>, &Proposal> = HashMap::new();
    for proposal in by_peer.into_values() {
        by_track
            .entry(proposal.lead_track_id())
            .and_modify(|kept| {
                if proposal.proposal_hash < kept.proposal_hash {
                    *kept = proposal;
                }
            })
            .or_insert(proposal);
    }

    let mut candidates: Vec<&Proposal> = by_track.into_values().collect();
    candidates.sort_by(|a, b| a.proposal_hash.cmp(&b.proposal_hash).then_with(|| a.peer_id.cmp(&b.peer_id)));
    candidates
}

/// Deterministic winner for `round_id`: `seed = hash(round_id || sorted hashes)`, `index = seed mod N`.
///
/// Candidates are re-sorted by hash so arrival order never matters.
pub fn select<'a>(round_id: RoundId, candidates: &[&'a Proposal]) -> Result<Selection<'a>, UnisonError> {
    if candidates.is_empty() {
        return Err(UnisonError::NoValidProposals { round_id });
    }
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| a.proposal_hash.cmp(&b.proposal_hash).then_with(|| a.peer_id.cmp(&b.peer_id)));

    let hashes: Vec<String> = sorted.iter().map(|p| p.proposal_hash.to_hex()).collect();
    let seed = canonical_seed(round_id, &hashes);
    let index = seed_index(&seed, sorted.len());
    Ok(Selection { winner: sorted[index], index, candidate_count: sorted.len(), seed })
}
