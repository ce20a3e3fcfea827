use crate::fixtures::resolved;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use unison_core::application::PinRetentionManager;
use unison_core::foundation::{ContentId, RoundId};
use unison_core::infrastructure::storage::JsonStateStore;
use unison_core::infrastructure::store::MemoryContentStore;

fn ids(round_id: u64, count: u32) -> Vec<ContentId> {
    (0..count).map(|i| ContentId::new(format!("r{round_id}-s{i}"))).collect()
}

fn store_with_rounds(rounds: std::ops::RangeInclusive<u64>, per_round: u32) -> Arc<MemoryContentStore> {
    let store = Arc::new(MemoryContentStore::new());
    for round_id in rounds {
        for content_id in ids(round_id, per_round) {
            store.insert(content_id, Bytes::from_static(b"segment"));
        }
    }
    store
}

#[tokio::test]
async fn test_retention_when_six_rounds_resolved_then_latest_three_and_active_window_stay_pinned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = Arc::new(JsonStateStore::open(dir.path()).expect("state"));
    let store = store_with_rounds(1..=6, 2);
    let manager = PinRetentionManager::new(store.clone(), state.clone(), 3, 0).expect("manager");

    for round_id in 1..=6 {
        manager.on_round_resolved(&resolved(round_id, 2), round_id).await.expect("pin");
    }
    assert_eq!(store.pinned().len(), 12);

    let active: HashSet<ContentId> = [ContentId::from("r2-s1")].into_iter().collect();
    let report = manager.cleanup(&active, RoundId::MAX).await.expect("cleanup");
    assert_eq!(report.unpinned, 5);
    assert_eq!(report.dropped_rounds, vec![1, 3]);

    let mut expected: HashSet<ContentId> = (4..=6).flat_map(|r| ids(r, 2)).collect();
    expected.insert(ContentId::from("r2-s1"));
    assert_eq!(store.pinned(), expected);

    // The lingering record survives a restart and is released once it leaves the window.
    drop(manager);
    let restarted = PinRetentionManager::new(store.clone(), state, 3, 0).expect("restart");
    assert!(restarted.is_pinned(&ContentId::from("r2-s1")));
    let report = restarted.cleanup(&HashSet::new(), RoundId::MAX).await.expect("cleanup");
    assert_eq!(report.unpinned, 1);
    assert!(!store.is_pinned(&ContentId::from("r2-s1")));
    assert_eq!(store.pinned().len(), 6);
}

#[tokio::test]
async fn test_retention_when_content_missing_then_realize_reports_pin_failure_and_cleanup_retries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = Arc::new(JsonStateStore::open(dir.path()).expect("state"));
    let store = Arc::new(MemoryContentStore::new());
    let manager = PinRetentionManager::new(store.clone(), state, 3, 0).expect("manager");

    let content = ids(9, 1);
    let err = manager.realize(9, &content, u64::MAX, 0).await.expect_err("missing content");
    assert_eq!(err.code(), unison_core::foundation::ErrorCode::PinFailure);

    store.insert(content[0].clone(), Bytes::from_static(b"late"));
    let report = manager.cleanup(&HashSet::new(), RoundId::MAX).await.expect("cleanup");
    assert_eq!(report.retried_pins, 1);
    assert!(store.is_pinned(&content[0]));
}

#[tokio::test]
async fn test_retention_when_rounds_queued_ahead_of_playback_then_none_are_released() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = Arc::new(JsonStateStore::open(dir.path()).expect("state"));
    let store = store_with_rounds(8..=13, 30);
    let manager = PinRetentionManager::new(store.clone(), state, 3, 0).expect("manager");
    for round_id in 8..=13 {
        manager.realize(round_id, &ids(round_id, 30), u64::MAX, round_id).await.expect("realize");
    }

    // Playing round 9 with the window spanning all of round 8 and the first ten segments of round 9.
    let active: HashSet<ContentId> = ids(8, 30).into_iter().chain(ids(9, 10)).collect();
    let report = manager.cleanup(&active, 9).await.expect("cleanup");
    assert_eq!(report.unpinned, 0);
    assert!(report.dropped_rounds.is_empty());
    assert_eq!(store.pinned().len(), 6 * 30);
    assert!(store.is_pinned(&ContentId::from("r10-s0")));

    // Once round 13 plays, only rounds 10..=12 of the played ones are kept.
    let active: HashSet<ContentId> = ids(13, 4).into_iter().collect();
    let report = manager.cleanup(&active, 13).await.expect("cleanup");
    assert_eq!(report.dropped_rounds, vec![8, 9]);
    assert_eq!(report.unpinned, 60);
    assert!(!store.is_pinned(&ContentId::from("r9-s29")));
    assert!(store.is_pinned(&ContentId::from("r10-s0")));
}
