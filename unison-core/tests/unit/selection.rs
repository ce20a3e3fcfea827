use crate::fixtures::proposal;
use std::collections::{HashMap, HashSet};
use unison_core::domain::coordination::{canonical_candidates, select, Proposal};
use unison_core::domain::hashes::{canonical_seed, seed_index};
use unison_core::foundation::{PeerId, UnisonError};

#[test]
fn test_seed_when_round_42_with_hashes_a1_b2_c3_then_hash_of_concatenation() {
    let seed = canonical_seed(42, &["A1", "B2", "C3"]);
    assert_eq!(seed, *blake3::hash(b"42A1B2C3").as_bytes());

    let proposals = ["A1", "B2", "C3"];
    let index = seed_index(&seed, proposals.len());
    assert!(index < 3);
    // The same inputs always land on the same entry.
    assert_eq!(seed_index(&canonical_seed(42, &proposals), 3), index);
}

#[test]
fn test_select_when_round_42_with_three_proposals_then_winner_is_seed_mod_three() {
    let proposals = vec![proposal(42, "peer-a", "track-a", 3, 1), proposal(42, "peer-b", "track-b", 3, 2), proposal(42, "peer-c", "track-c", 3, 3)];
    let mut sorted: Vec<&Proposal> = proposals.iter().collect();
    sorted.sort_by_key(|p| p.proposal_hash);
    let hashes: Vec<String> = sorted.iter().map(|p| p.proposal_hash.to_hex()).collect();
    let expected = seed_index(&canonical_seed(42, &hashes), 3);

    let refs: Vec<&Proposal> = proposals.iter().collect();
    let selection = select(42, &refs).expect("winner");
    assert_eq!(selection.index, expected);
    assert_eq!(selection.winner.proposal_hash, sorted[expected].proposal_hash);
    assert_eq!(selection.candidate_count, 3);
}

#[test]
fn test_select_when_peers_see_different_arrival_orders_then_same_winner() {
    let proposals: Vec<Proposal> = (0..7).map(|i| proposal(99, &format!("peer-{i}"), &format!("track-{i}"), 2, i)).collect();
    let forward: Vec<&Proposal> = proposals.iter().collect();
    let reversed: Vec<&Proposal> = proposals.iter().rev().collect();
    let interleaved: Vec<&Proposal> = proposals.iter().step_by(2).chain(proposals.iter().skip(1).step_by(2)).collect();

    let none = HashSet::new();
    let winners: Vec<_> = [forward, reversed, interleaved]
        .iter()
        .map(|view| {
            let candidates = canonical_candidates(view.iter().copied(), &none);
            select(99, &candidates).expect("winner").winner.proposal_hash
        })
        .collect();
    assert!(winners.windows(2).all(|w| w[0] == w[1]), "{winners:?}");
}

#[test]
fn test_select_when_no_candidates_then_no_valid_proposals() {
    let excluded: HashSet<PeerId> = [PeerId::from("only")].into_iter().collect();
    let proposals = [proposal(5, "only", "t", 1, 1)];
    let candidates = canonical_candidates(proposals.iter(), &excluded);
    assert!(matches!(select(5, &candidates), Err(UnisonError::NoValidProposals { round_id: 5 })));
}

#[test]
fn test_fairness_when_five_peers_over_ten_thousand_rounds_then_chi_square_within_bound() {
    const N: usize = 5;
    const ROUNDS: u64 = 12_000;
    let mut wins: HashMap<PeerId, u64> = HashMap::new();
    for round_id in 0..ROUNDS {
        // Fresh proposals every round, as peers would build them.
        let proposals: Vec<Proposal> =
            (0..N).map(|i| proposal(round_id, &format!("peer-{i}"), &format!("track-{i}-{round_id}"), 1, round_id)).collect();
        let refs: Vec<&Proposal> = proposals.iter().collect();
        let winner = select(round_id, &refs).expect("winner").winner.peer_id.clone();
        *wins.entry(winner).or_default() += 1;
    }
    let expected = ROUNDS as f64 / N as f64;
    let chi_square: f64 = (0..N)
        .map(|i| {
            let observed = *wins.get(&PeerId::new(format!("peer-{i}"))).unwrap_or(&0) as f64;
            (observed - expected).powi(2) / expected
        })
        .sum();
    // Critical value for df = 4 at p = 0.0001.
    assert!(chi_square < 23.51, "chi_square={chi_square} wins={wins:?}");
}
