use crate::domain::catalog::SegmentRef;
use crate::domain::coordination::QueueSnapshot;
use crate::domain::stream::StreamState;
use crate::foundation::RoundId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSegment {
    pub round_id: RoundId,
    pub is_fallback: bool,
    pub segment: SegmentRef,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorMove {
    /// Segments that left the trailing edge (added to the sequence number).
    pub advanced: u64,
    /// Set when the cursor entered a new round.
    pub entered_round: Option<RoundId>,
    /// The queue head was ahead of the cursor and the cursor jumped to it.
    pub jumped: bool,
}

impl CursorMove {
    pub fn changed(&self) -> bool {
        self.advanced > 0 || self.entered_round.is_some() || self.jumped
    }
}

/// Up to `max_segments` segments from the cursor, drawn only from consecutive resolved rounds.
pub fn compute_window(snapshot: &QueueSnapshot, state: &StreamState, max_segments: usize) -> Vec<WindowSegment> {
    let mut window = Vec::with_capacity(max_segments);
    for round in snapshot.resolved_run_from(state.current_round_id) {
        let skip = if round.round_id == state.current_round_id { state.window_start_offset as usize } else { 0 };
        for segment in round.segments().iter().skip(skip) {
            if window.len() >= max_segments {
                return window;
            }
            window.push(WindowSegment { round_id: round.round_id, is_fallback: round.is_fallback, segment: segment.clone() });
        }
    }
    window
}

/// Moves the cursor forward by one segment, keeping at least one segment in the window.
///
/// Before advancing, the cursor catches up with the queue head and steps over resolved rounds
/// that have no remaining content. The sequence number only grows when a segment actually leaves;
/// a jump counts every segment the cursor passes over, including rounds that already left the queue.
pub fn advance_cursor(snapshot: &QueueSnapshot, state: &mut StreamState) -> CursorMove {
    let mut movement = CursorMove::default();
    if snapshot.current_round_id > state.current_round_id {
        let dropped = dropped_by_jump(snapshot, state);
        state.sequence_number += dropped;
        movement.advanced = dropped;
        state.current_round_id = snapshot.current_round_id;
        state.window_start_offset = 0;
        movement.jumped = true;
        movement.entered_round = Some(state.current_round_id);
    }
    skip_exhausted_rounds(snapshot, state, &mut movement);

    if compute_window(snapshot, state, 2).len() < 2 {
        return movement;
    }
    state.sequence_number += 1;
    state.window_start_offset += 1;
    movement.advanced += 1;
    skip_exhausted_rounds(snapshot, state, &mut movement);
    movement
}

/// Unplayed segments of the cursor's round plus every resolved round between it and the queue head.
fn dropped_by_jump(snapshot: &QueueSnapshot, state: &StreamState) -> u64 {
    let rest_of_current =
        snapshot.round_length(state.current_round_id).unwrap_or(0).saturating_sub(state.window_start_offset as usize);
    let skipped: usize = snapshot.departed.range(state.current_round_id + 1..snapshot.current_round_id).map(|(_, n)| n).sum();
    (rest_of_current + skipped) as u64
}

fn skip_exhausted_rounds(snapshot: &QueueSnapshot, state: &mut StreamState, movement: &mut CursorMove) {
    while let Some(round) = snapshot.get(state.current_round_id).and_then(|slot| slot.resolved.as_ref()) {
        if (state.window_start_offset as usize) < round.segments().len() {
            break;
        }
        state.current_round_id += 1;
        state.window_start_offset = 0;
        movement.entered_round = Some(state.current_round_id);
    }
}
