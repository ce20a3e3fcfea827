use crate::fixtures::S;
use std::sync::Arc;
use unison_core::application::DivergenceService;
use unison_core::domain::{DivergenceConfig, PlaybackReport};
use unison_core::foundation::{PeerId, ProposalHash};
use unison_core::infrastructure::storage::{MemoryStateStore, StateStore};

fn report(peer: &str, round_id: u64, consensus: u8, playing: u8) -> PlaybackReport {
    PlaybackReport {
        peer_id: PeerId::from(peer),
        round_id,
        consensus_winner_hash: Some(ProposalHash::new([consensus; 32])),
        actually_playing_hash: Some(ProposalHash::new([playing; 32])),
    }
}

fn service(state: Arc<MemoryStateStore>) -> DivergenceService {
    let config = DivergenceConfig { threshold_ns: 600 * S, peer_ttl_ns: 1_800 * S };
    DivergenceService::new(PeerId::from("local"), config, state).expect("service")
}

#[test]
fn test_divergence_when_past_threshold_then_excluded_and_rejoins_on_first_agreeing_report() {
    let state = Arc::new(MemoryStateStore::new());
    let mut divergence = service(state);
    let peer = PeerId::from("drifter");

    for (i, at) in [0u64, 200, 400, 600].iter().enumerate() {
        assert!(!divergence.record_report(&report("drifter", i as u64, 1, 2), at * S).expect("record"));
    }
    assert!(!divergence.excluded().contains(&peer));
    assert!(divergence.record_report(&report("drifter", 4, 1, 2), 601 * S).expect("record"));
    assert!(divergence.excluded().contains(&peer));

    assert!(divergence.record_report(&report("drifter", 5, 7, 7), 602 * S).expect("record"));
    assert!(divergence.excluded().is_empty());
}

#[test]
fn test_divergence_when_restarted_then_exclusions_restored_from_state() {
    let state = Arc::new(MemoryStateStore::new());
    {
        let mut divergence = service(state.clone());
        divergence.record_report(&report("drifter", 1, 1, 2), 0).expect("record");
        divergence.record_report(&report("drifter", 2, 1, 2), 700 * S).expect("record");
        assert_eq!(divergence.excluded().len(), 1);
    }
    assert!(state.load_peer_sync().expect("load").is_some());
    let restored = service(state);
    assert!(restored.excluded().contains(&PeerId::from("drifter")));
}

#[test]
fn test_divergence_when_no_consensus_hash_then_never_excluded() {
    let state = Arc::new(MemoryStateStore::new());
    let mut divergence = service(state);
    let unresolved = PlaybackReport { peer_id: PeerId::from("p"), round_id: 1, consensus_winner_hash: None, actually_playing_hash: None };
    divergence.record_report(&unresolved, 0).expect("record");
    divergence.record_report(&unresolved, 5_000 * S).expect("record");
    assert!(divergence.excluded().is_empty());
    assert!(!divergence.refresh(5_001 * S).expect("refresh"));
}
