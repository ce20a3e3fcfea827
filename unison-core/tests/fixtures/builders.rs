#![allow(dead_code)]

use crate::fixtures::{S, TEST_QUEUE_DEPTH, TEST_ROUND_SECS, TEST_SEGMENT_MS};
use std::sync::Arc;
use unison_core::application::CoordinatorConfig;
use unison_core::domain::coordination::{LookaheadQueue, Proposal, ProposalBody, QueueSnapshot, ResolvedRound, RoundTimingConfig};
use unison_core::domain::{Catalog, SegmentRef, Track};
use unison_core::foundation::{ContentId, PeerId, RoundId, TrackId};

pub fn segments(track_id: &TrackId, count: u32) -> Vec<SegmentRef> {
    (0..count)
        .map(|i| SegmentRef {
            track_id: track_id.clone(),
            segment_index: i,
            content_id: ContentId::new(format!("{track_id}-s{i}")),
            duration_ms: TEST_SEGMENT_MS,
        })
        .collect()
}

pub fn track(id: &str, count: u32) -> Track {
    let track_id = TrackId::from(id);
    Track { segments: segments(&track_id, count), track_id, title: None }
}

pub fn catalog(peer: &PeerId, track_ids: &[&str], segments_per_track: u32) -> Catalog {
    Catalog::new(peer.clone(), track_ids.iter().map(|id| track(id, segments_per_track)).collect())
}

pub fn proposal(round_id: RoundId, peer: &str, track_id: &str, count: u32, timestamp_ns: u64) -> Proposal {
    let track_id = TrackId::from(track_id);
    let segs = segments(&track_id, count);
    Proposal::new(round_id, PeerId::from(peer), ProposalBody::Track { track_id }, segs, timestamp_ns)
}

/// Resolved round whose content ids are `r<round>-s<i>`.
pub fn resolved(round_id: RoundId, count: u32) -> Arc<ResolvedRound> {
    let track_id = TrackId::new(format!("r{round_id}"));
    let winner = (count > 0).then(|| {
        let segs = segments(&track_id, count);
        Proposal::new(round_id, PeerId::from("winner"), ProposalBody::Track { track_id: track_id.clone() }, segs, round_id)
    });
    let consensus_hash = winner.as_ref().map(|w| w.proposal_hash);
    Arc::new(ResolvedRound { round_id, winner, consensus_hash, is_fallback: false, candidate_count: 1, resolved_at_ns: round_id })
}

pub fn queue_snapshot(head: RoundId, depth: usize, rounds: &[(RoundId, u32)]) -> QueueSnapshot {
    let mut queue = LookaheadQueue::new(head, depth);
    for (round_id, count) in rounds {
        queue.fill(resolved(*round_id, *count));
    }
    queue.snapshot()
}

pub fn timing() -> RoundTimingConfig {
    RoundTimingConfig {
        epoch_ns: 0,
        round_duration_ns: TEST_ROUND_SECS * S,
        queue_depth: TEST_QUEUE_DEPTH,
        ..RoundTimingConfig::default()
    }
}

pub fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig { timing: timing(), history_limit: 32, max_early_proposals: 64 }
}
