use proptest::prelude::*;
use std::collections::HashSet;
use unison_core::domain::PinLedger;
use unison_core::foundation::{ContentId, RoundId};

fn content(round_id: RoundId, count: usize) -> Vec<ContentId> {
    (0..count).map(|i| ContentId::new(format!("r{round_id}-s{i}"))).collect()
}

#[test]
fn test_cleanup_when_old_round_shares_content_with_retained_round_then_shared_id_stays_pinned() {
    let mut ledger = PinLedger::new(1);
    ledger.record(1, vec![ContentId::from("shared"), ContentId::from("old-only")], 1);
    ledger.record(2, vec![ContentId::from("shared")], 2);
    let plan = ledger.plan_cleanup(&HashSet::new(), RoundId::MAX);
    assert_eq!(plan.unpin, vec![ContentId::from("old-only")]);
    assert_eq!(plan.dropped_rounds, vec![1]);
}

#[test]
fn test_cleanup_when_failed_unpin_then_retried_next_pass() {
    let mut ledger = PinLedger::new(1);
    ledger.record(1, content(1, 1), 1);
    ledger.record(2, content(2, 1), 2);
    let first = ledger.plan_cleanup(&HashSet::new(), RoundId::MAX);
    assert_eq!(first.unpin, content(1, 1));
    ledger.mark_unpin_failed(first.unpin[0].clone());

    let retry = ledger.plan_cleanup(&HashSet::new(), RoundId::MAX);
    assert_eq!(retry.unpin, content(1, 1));
}

proptest! {
    #[test]
    fn test_cleanup_when_rounds_accumulate_then_latest_l_played_queued_and_active_window_survive(
        limit in 1usize..6,
        rounds in 1u64..20,
        playing_round in 0u64..24,
        per_round in 1usize..4,
        window_picks in proptest::collection::vec((0u64..20, 0usize..4), 0..8),
    ) {
        let mut ledger = PinLedger::new(limit);
        for round_id in 0..rounds {
            ledger.record(round_id, content(round_id, per_round), round_id);
        }
        let active: HashSet<ContentId> = window_picks
            .iter()
            .filter(|(round_id, i)| *round_id < rounds && *i < per_round)
            .map(|(round_id, i)| ContentId::new(format!("r{round_id}-s{i}")))
            .collect();

        let plan = ledger.plan_cleanup(&active, playing_round);
        let unpinned: HashSet<ContentId> = plan.unpin.iter().cloned().collect();
        let live = ledger.live_content_ids();
        let first_kept = playing_round.min(rounds).saturating_sub(limit as u64);

        for round_id in 0..rounds {
            for content_id in content(round_id, per_round) {
                let retained = round_id >= first_kept || active.contains(&content_id);
                prop_assert_eq!(live.contains(&content_id), retained, "round {} id {}", round_id, content_id);
                prop_assert_eq!(unpinned.contains(&content_id), !retained, "round {} id {}", round_id, content_id);
            }
        }
        let played_kept = ledger.records().filter(|r| r.round_id >= first_kept && r.round_id < playing_round).count();
        prop_assert!(played_kept <= limit);
    }
}
