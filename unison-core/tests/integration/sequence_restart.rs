use crate::fixtures::{coordinator_config, queue_snapshot, resolved, S, TEST_ROUND_SECS};
use std::sync::Arc;
use unison_core::application::{ComposerConfig, RoundCoordinator, StreamComposer};
use unison_core::domain::coordination::{QueueSnapshot, ResolvedRound};
use unison_core::infrastructure::storage::json::{PLAYLIST_FILE, STREAM_STATE_FILE};
use unison_core::infrastructure::storage::{JsonStateStore, StateStore};
use unison_core::infrastructure::store::MemoryContentStore;

fn config() -> ComposerConfig {
    ComposerConfig {
        window_segments: 4,
        advance_every: 1,
        node_label: "restart-node".to_string(),
        name_key: "self".to_string(),
        name_ttl: "1m".to_string(),
        name_lifetime: "24h".to_string(),
        allow_offline: true,
        bandwidth: 96_000,
        codecs: "mp4a.40.2".to_string(),
        gateway_url: "http://127.0.0.1:8080".to_string(),
    }
}

fn open(dir: &std::path::Path, store: &Arc<MemoryContentStore>, head: u64) -> StreamComposer {
    let state = Arc::new(JsonStateStore::open(dir).expect("state"));
    StreamComposer::new(config(), store.clone(), state, head, 0).expect("composer")
}

async fn run_ticks(composer: &mut StreamComposer, snapshot: &QueueSnapshot, ticks: u64, start_ns: u64) -> Vec<u64> {
    let mut sequences = Vec::new();
    for i in 0..ticks {
        let tick = composer.tick(snapshot, start_ns + i).await.expect("tick");
        sequences.push(tick.sequence_number);
    }
    sequences
}

#[tokio::test]
async fn test_sequence_when_node_restarts_repeatedly_then_never_decreases() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryContentStore::new());
    let snapshot = queue_snapshot(10, 5, &[(10, 6), (11, 6), (12, 6), (13, 6), (14, 6)]);

    let mut observed = Vec::new();
    for restart in 0..4u64 {
        let mut composer = open(dir.path(), &store, 10);
        if let Some(&last) = observed.last() {
            assert!(composer.state().sequence_number >= last, "restart {restart} went backwards");
        }
        observed.extend(run_ticks(&mut composer, &snapshot, 3, restart * 100).await);
    }
    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
    assert!(observed.last().copied().unwrap_or_default() > 0);

    let state = JsonStateStore::open(dir.path()).expect("state");
    let manifest = state.load_manifest().expect("load").expect("published");
    assert_eq!(Some(manifest.sequence_number), observed.last().copied());
    let playlist = std::fs::read_to_string(dir.path().join(PLAYLIST_FILE)).expect("playlist");
    assert!(playlist.contains(&format!("#EXT-X-MEDIA-SEQUENCE:{}", manifest.sequence_number)));
}

#[tokio::test]
async fn test_sequence_when_stream_state_lost_then_resumes_from_last_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryContentStore::new());
    let snapshot = queue_snapshot(10, 5, &[(10, 6), (11, 6), (12, 6)]);

    let published = {
        let mut composer = open(dir.path(), &store, 10);
        *run_ticks(&mut composer, &snapshot, 5, 0).await.last().expect("ticks")
    };
    assert!(published > 0);
    std::fs::remove_file(dir.path().join(STREAM_STATE_FILE)).expect("remove state");

    let composer = open(dir.path(), &store, 10);
    assert_eq!(composer.state().sequence_number, published);
}

#[tokio::test]
async fn test_sequence_when_restarted_behind_queue_head_then_counts_skipped_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryContentStore::new());
    let history: Vec<ResolvedRound> = (10..=14).map(|round_id| resolved(round_id, 4).as_ref().clone()).collect();
    let round_start = |round_id: u64| round_id * TEST_ROUND_SECS * S + 1;

    {
        let coordinator = RoundCoordinator::new(coordinator_config(), round_start(10), history.clone());
        let mut composer = open(dir.path(), &store, 10);
        let sequences = run_ticks(&mut composer, &coordinator.snapshot(), 2, round_start(10)).await;
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!((composer.state().current_round_id, composer.state().window_start_offset), (10, 2));
    }

    // Round 10 left the queue while the node was down; its last two segments were never played.
    let coordinator = RoundCoordinator::new(coordinator_config(), round_start(11), history);
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.current_round_id, 11);
    assert_eq!(snapshot.round_length(10), Some(4));

    let mut composer = open(dir.path(), &store, 11);
    let tick = composer.tick(&snapshot, round_start(11)).await.expect("tick");
    assert!(tick.movement.jumped);
    assert_eq!(tick.movement.advanced, 3);
    assert_eq!(tick.sequence_number, 5);

    let state = JsonStateStore::open(dir.path()).expect("state");
    let manifest = state.load_manifest().expect("load").expect("published");
    assert_eq!(manifest.sequence_number, 5);
    assert_eq!(manifest.segments[0].content_id.as_str(), "r11-s1");
    let playlist = std::fs::read_to_string(dir.path().join(PLAYLIST_FILE)).expect("playlist");
    assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:5"));
}
