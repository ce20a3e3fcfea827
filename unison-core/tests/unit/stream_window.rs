use crate::fixtures::queue_snapshot;
use proptest::prelude::*;
use unison_core::domain::coordination::QueueSnapshot;
use unison_core::domain::stream::{advance_cursor, compute_window, StreamState, WindowSegment};
use unison_core::foundation::RoundId;

/// Every round between the cursor and the last window entry is resolved, and segments appear in order.
fn assert_gapless(snapshot: &QueueSnapshot, state: &StreamState, window: &[WindowSegment]) {
    let Some(last) = window.last() else { return };
    for round_id in state.current_round_id..=last.round_id {
        let resolved = snapshot.get(round_id).and_then(|slot| slot.resolved.as_ref());
        assert!(resolved.is_some(), "window crosses unresolved round {round_id}");
    }
    for pair in window.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.round_id == b.round_id {
            assert_eq!(a.segment.segment_index + 1, b.segment.segment_index);
        } else {
            assert!(b.round_id > a.round_id);
            assert_eq!(b.segment.segment_index, 0);
        }
    }
}

#[test]
fn test_window_when_next_round_unresolved_then_stops_at_boundary() {
    let snapshot = queue_snapshot(20, 5, &[(20, 4), (22, 4)]);
    let state = StreamState { current_round_id: 20, window_start_offset: 1, ..Default::default() };
    let window = compute_window(&snapshot, &state, 40);
    assert_eq!(window.len(), 3);
    assert!(window.iter().all(|w| w.round_id == 20));
}

#[test]
fn test_advance_when_only_one_segment_left_then_window_never_empties() {
    let snapshot = queue_snapshot(3, 5, &[(3, 2)]);
    let mut state = StreamState { sequence_number: 7, current_round_id: 3, ..Default::default() };
    assert_eq!(advance_cursor(&snapshot, &mut state).advanced, 1);
    assert_eq!(advance_cursor(&snapshot, &mut state).advanced, 0);
    assert_eq!(state.sequence_number, 8);
    assert_eq!(compute_window(&snapshot, &state, 10).len(), 1);
}

proptest! {
    #[test]
    fn test_window_when_cursor_advances_then_bounded_gapless_and_monotonic(
        head in 0u64..1_000,
        fill in proptest::collection::vec((any::<bool>(), 0u32..8), 5),
        max_segments in 1usize..24,
        steps in 0usize..40,
    ) {
        let rounds: Vec<(RoundId, u32)> = fill
            .iter()
            .enumerate()
            .filter(|(_, (resolved, _))| *resolved)
            .map(|(i, (_, count))| (head + i as u64, *count))
            .collect();
        let snapshot = queue_snapshot(head, 5, &rounds);
        let mut state = StreamState { sequence_number: 500, current_round_id: head, ..Default::default() };

        let mut last_sequence = state.sequence_number;
        for _ in 0..steps {
            let before = compute_window(&snapshot, &state, max_segments);
            let movement = advance_cursor(&snapshot, &mut state);
            let window = compute_window(&snapshot, &state, max_segments);

            prop_assert!(window.len() <= max_segments);
            assert_gapless(&snapshot, &state, &window);
            prop_assert!(state.sequence_number >= last_sequence);
            prop_assert_eq!(state.sequence_number - last_sequence, movement.advanced);
            if !before.is_empty() {
                prop_assert!(!window.is_empty(), "advancing emptied a non-empty window");
            }
            last_sequence = state.sequence_number;
        }
    }
}
