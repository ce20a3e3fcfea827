use crate::domain::catalog::{Catalog, SegmentRef, Track};
use crate::domain::hashes::proposal_hash;
use crate::foundation::{ContentId, PeerId, ProposalHash, RoundId, TrackId, UnisonError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const MAX_SEGMENTS_PER_PROPOSAL: usize = 4_096;
pub const MAX_TRACKS_PER_PROPOSAL: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalMode {
    #[default]
    SingleTrack,
    TrackList,
}

impl fmt::Display for ProposalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalMode::SingleTrack => f.write_str("single_track"),
            ProposalMode::TrackList => f.write_str("track_list"),
        }
    }
}

impl FromStr for ProposalMode {
    type Err = UnisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "single_track" => Ok(ProposalMode::SingleTrack),
            "track_list" => Ok(ProposalMode::TrackList),
            other => Err(UnisonError::ConfigError(format!("unknown proposal_mode: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalBody {
    Track { track_id: TrackId },
    TrackList { track_ids: Vec<TrackId> },
}

impl ProposalBody {
    pub fn track_ids(&self) -> &[TrackId] {
        match self {
            ProposalBody::Track { track_id } => std::slice::from_ref(track_id),
            ProposalBody::TrackList { track_ids } => track_ids,
        }
    }
}

/// A peer's hash-committed candidate for one round. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub round_id: RoundId,
    pub peer_id: PeerId,
    pub body: ProposalBody,
    pub segments: Vec<SegmentRef>,
    pub timestamp_ns: u64,
    pub proposal_hash: ProposalHash,
}

impl Proposal {
    pub fn new(round_id: RoundId, peer_id: PeerId, body: ProposalBody, segments: Vec<SegmentRef>, timestamp_ns: u64) -> Self {
        let content_ids: Vec<ContentId> = segments.iter().map(|s| s.content_id.clone()).collect();
        let proposal_hash = proposal_hash(round_id, &peer_id, &content_ids, timestamp_ns);
        Self { round_id, peer_id, body, segments, timestamp_ns, proposal_hash }
    }

    pub fn content_ids(&self) -> Vec<ContentId> {
        self.segments.iter().map(|s| s.content_id.clone()).collect()
    }

    /// Track used for cross-peer duplicate detection: the only track, or the first of a list.
    pub fn lead_track_id(&self) -> Option<&TrackId> {
        self.body.track_ids().first()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }

    pub fn compute_hash(&self) -> ProposalHash {
        proposal_hash(self.round_id, &self.peer_id, &self.content_ids(), self.timestamp_ns)
    }

    /// Structural checks plus hash recomputation. Does not consult round state.
    pub fn validate(&self) -> Result<(), UnisonError> {
        let reject = |details: String| Err(UnisonError::ProposalValidationFailed { details });

        if self.peer_id.is_empty() {
            return reject("empty peer_id".to_string());
        }
        let track_ids = self.body.track_ids();
        if track_ids.is_empty() || track_ids.len() > MAX_TRACKS_PER_PROPOSAL {
            return reject(format!("track count out of bounds: {}", track_ids.len()));
        }
        if self.segments.is_empty() || self.segments.len() > MAX_SEGMENTS_PER_PROPOSAL {
            return reject(format!("segment count out of bounds: {}", self.segments.len()));
        }

        // Segments must walk the declared tracks in order, each track starting at index 0.
        let mut tracks = track_ids.iter();
        let mut current = tracks.next();
        let mut next_index = 0u32;
        for segment in &self.segments {
            if segment.duration_ms == 0 {
                return reject(format!("zero duration segment {}:{}", segment.track_id, segment.segment_index));
            }
            if Some(&segment.track_id) != current {
                if next_index == 0 {
                    return reject(format!("unexpected track {}", segment.track_id));
                }
                current = tracks.next();
                next_index = 0;
                if Some(&segment.track_id) != current {
                    return reject(format!("unexpected track {}", segment.track_id));
                }
            }
            if segment.segment_index != next_index {
                return reject(format!("segment index gap in {}: expected {} got {}", segment.track_id, next_index, segment.segment_index));
            }
            next_index += 1;
        }
        if tracks.next().is_some() {
            return reject("declared track without segments".to_string());
        }

        if !self.compute_hash().ct_eq(&self.proposal_hash) {
            return reject("proposal_hash_mismatch".to_string());
        }
        Ok(())
    }
}

/// Inputs for turning a catalog entry into a proposal.
pub struct ProposalRequest<'a> {
    pub round_id: RoundId,
    pub catalog: &'a Catalog,
    pub mode: ProposalMode,
    pub target_duration_ms: u64,
    pub avoid: &'a HashSet<TrackId>,
    /// Caller-supplied randomness used to choose the starting track.
    pub pick: usize,
    pub now_ns: u64,
}

/// Picks a start track (skipping `avoid` when the catalog allows) and builds the proposal.
///
/// In `TrackList` mode consecutive catalog tracks are appended until the round's target
/// duration is covered or every track has been used once.
pub fn build_proposal(request: ProposalRequest<'_>) -> Result<Proposal, UnisonError> {
    let catalog = request.catalog;
    if catalog.is_empty() {
        return Err(UnisonError::CatalogError("local catalog is empty".to_string()));
    }

    let fresh: Vec<usize> = (0..catalog.len()).filter(|idx| !request.avoid.contains(&catalog.tracks[*idx].track_id)).collect();
    let start = if fresh.is_empty() { request.pick % catalog.len() } else { fresh[request.pick % fresh.len()] };

    let chosen: Vec<&Track> = match request.mode {
        ProposalMode::SingleTrack => vec![&catalog.tracks[start]],
        ProposalMode::TrackList => {
            let mut chosen = Vec::new();
            let mut total = 0u64;
            for offset in 0..catalog.len().min(MAX_TRACKS_PER_PROPOSAL) {
                let track = &catalog.tracks[(start + offset) % catalog.len()];
                if offset > 0 && !fresh.is_empty() && request.avoid.contains(&track.track_id) {
                    continue;
                }
                total = total.saturating_add(track.total_duration_ms());
                chosen.push(track);
                if total >= request.target_duration_ms {
                    break;
                }
            }
            chosen
        }
    };

    let body = match request.mode {
        ProposalMode::SingleTrack => ProposalBody::Track { track_id: chosen[0].track_id.clone() },
        ProposalMode::TrackList => ProposalBody::TrackList { track_ids: chosen.iter().map(|t| t.track_id.clone()).collect() },
    };
    let segments: Vec<SegmentRef> = chosen.iter().flat_map(|t| t.segments.iter().cloned()).collect();
    let proposal = Proposal::new(request.round_id, catalog.peer_id.clone(), body, segments, request.now_ns);
    proposal.validate()?;
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, segments: u32, duration_ms: u64) -> Track {
        let track_id = TrackId::from(id);
        Track {
            track_id: track_id.clone(),
            title: None,
            segments: (0..segments)
                .map(|i| SegmentRef { track_id: track_id.clone(), segment_index: i, content_id: ContentId::new(format!("{id}/{i}")), duration_ms })
                .collect(),
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(PeerId::from("peer-a"), vec![track("t1", 2, 6_000), track("t2", 3, 6_000), track("t3", 1, 6_000)])
    }

    fn request<'a>(catalog: &'a Catalog, avoid: &'a HashSet<TrackId>, mode: ProposalMode, pick: usize) -> ProposalRequest<'a> {
        ProposalRequest { round_id: 7, catalog, mode, target_duration_ms: 20_000, avoid, pick, now_ns: 1_000 }
    }

    #[test]
    fn single_track_proposal_carries_all_segments() {
        let catalog = catalog();
        let avoid = HashSet::new();
        let proposal = build_proposal(request(&catalog, &avoid, ProposalMode::SingleTrack, 1)).expect("proposal");
        assert_eq!(proposal.lead_track_id(), Some(&TrackId::from("t2")));
        assert_eq!(proposal.content_ids().len(), 3);
        assert_eq!(proposal.peer_id, PeerId::from("peer-a"));
        proposal.validate().expect("valid");
    }

    #[test]
    fn recently_played_tracks_are_skipped_when_possible() {
        let catalog = catalog();
        let avoid: HashSet<TrackId> = [TrackId::from("t1"), TrackId::from("t2")].into_iter().collect();
        for pick in 0..5 {
            let proposal = build_proposal(request(&catalog, &avoid, ProposalMode::SingleTrack, pick)).expect("proposal");
            assert_eq!(proposal.lead_track_id(), Some(&TrackId::from("t3")));
        }

        let everything: HashSet<TrackId> = catalog.tracks.iter().map(|t| t.track_id.clone()).collect();
        assert!(build_proposal(request(&catalog, &everything, ProposalMode::SingleTrack, 0)).is_ok());
    }

    #[test]
    fn track_list_fills_target_duration() {
        let catalog = catalog();
        let avoid = HashSet::new();
        let proposal = build_proposal(request(&catalog, &avoid, ProposalMode::TrackList, 0)).expect("proposal");
        assert_eq!(proposal.body.track_ids(), &[TrackId::from("t1"), TrackId::from("t2")]);
        assert_eq!(proposal.total_duration_ms(), 30_000);
        proposal.validate().expect("valid");
    }

    #[test]
    fn tampered_proposal_fails_validation() {
        let catalog = catalog();
        let avoid = HashSet::new();
        let mut proposal = build_proposal(request(&catalog, &avoid, ProposalMode::SingleTrack, 0)).expect("proposal");
        proposal.segments[0].content_id = ContentId::from("evil");
        assert!(matches!(proposal.validate(), Err(UnisonError::ProposalValidationFailed { .. })));

        let mut gap = build_proposal(request(&catalog, &avoid, ProposalMode::SingleTrack, 1)).expect("proposal");
        gap.segments.remove(1);
        gap.proposal_hash = gap.compute_hash();
        assert!(gap.validate().is_err());
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let catalog = Catalog::new(PeerId::from("p"), vec![]);
        let avoid = HashSet::new();
        assert!(matches!(build_proposal(request(&catalog, &avoid, ProposalMode::SingleTrack, 0)), Err(UnisonError::CatalogError(_))));
    }
}
