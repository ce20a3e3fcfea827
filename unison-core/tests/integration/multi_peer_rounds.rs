use crate::fixtures::{catalog, coordinator_config, S, TEST_NAMESPACE, TEST_ROUND_SECS};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use unison_core::application::{CoordinatorAction, ProposalBuilder, RoundCoordinator, StaticCatalogSource};
use unison_core::domain::coordination::{ProposalMode, ResolvedRound};
use unison_core::foundation::{PeerId, RoundId};
use unison_core::infrastructure::store::MemoryTopicHub;
use unison_core::infrastructure::transport::{
    Ed25519Signer, Ed25519Verifier, PubsubTransport, Transport, TransportMessage, TransportSubscription,
};

struct Peer {
    transport: PubsubTransport,
    coordinator: RoundCoordinator,
    builder: ProposalBuilder,
    subscription: TransportSubscription,
}

impl Peer {
    fn peer_id(&self) -> &PeerId {
        self.transport.local_peer_id()
    }
}

/// One second into round 10; with depth 5 round 13 is the one still accepting proposals.
const NOW: u64 = 10 * TEST_ROUND_SECS * S + S;
const TARGET: RoundId = 13;

async fn network(hub: &Arc<MemoryTopicHub>, seeds: &[u8]) -> Vec<Peer> {
    let mut peers = Vec::new();
    for &seed in seeds {
        let signer = Arc::new(Ed25519Signer::from_seed([seed; 32]));
        let transport = PubsubTransport::new(hub.clone(), signer, Arc::new(Ed25519Verifier), TEST_NAMESPACE);
        let track_id = format!("track-{seed}");
        let local = catalog(transport.local_peer_id(), &[track_id.as_str()], 12);
        let builder =
            ProposalBuilder::new(Arc::new(StaticCatalogSource::new(local)), ProposalMode::SingleTrack, TEST_ROUND_SECS * 1_000, 4);
        let coordinator = RoundCoordinator::new(coordinator_config(), NOW, Vec::new());
        let subscription = transport.subscribe_round(TARGET).await.expect("subscribe");
        peers.push(Peer { transport, coordinator, builder, subscription });
    }
    peers
}

/// Opens the round everywhere, gossips every local proposal and resolves the round on each peer.
async fn run_round(peers: &mut [Peer]) -> Vec<Arc<ResolvedRound>> {
    for peer in peers.iter_mut() {
        let actions = peer.coordinator.tick(NOW);
        assert!(actions.contains(&CoordinatorAction::NeedLocalProposal { round_id: TARGET, broadcast: true }), "{actions:?}");
        let proposal = peer.builder.build_with_pick(TARGET, NOW, 0).expect("build");
        assert!(peer.coordinator.submit_local_proposal(proposal.clone()).expect("submit"));
        peer.transport.publish_proposal(proposal).await.expect("publish");
    }

    let others = peers.len() - 1;
    for peer in peers.iter_mut() {
        for _ in 0..others {
            let next = tokio::time::timeout(Duration::from_secs(2), peer.subscription.next()).await.expect("delivered");
            let envelope = next.expect("open").expect("verified");
            let TransportMessage::Proposal(proposal) = envelope.payload else { panic!("unexpected payload") };
            assert_eq!(proposal.peer_id, envelope.sender_peer_id);
            peer.coordinator.on_proposal(proposal, NOW).expect("valid proposal");
        }
    }

    let schedule = peers[0].coordinator.clock().schedule(TARGET);
    let at = schedule.selecting_end_ns;
    let mut resolved = Vec::new();
    for peer in peers.iter_mut() {
        let actions = peer.coordinator.tick(at);
        let (content_ids, deadline_ns) = actions
            .iter()
            .find_map(|action| match action {
                CoordinatorAction::StartRealization { round_id, content_ids, deadline_ns } if *round_id == TARGET => {
                    Some((content_ids.clone(), *deadline_ns))
                }
                _ => None,
            })
            .expect("realization started");
        assert_eq!(deadline_ns, schedule.fetch_deadline_ns);
        assert!(!content_ids.is_empty());

        let actions = peer.coordinator.on_realization(TARGET, Ok(()), at + S);
        let round = actions
            .into_iter()
            .find_map(|action| match action {
                CoordinatorAction::RoundResolved(round) if round.round_id == TARGET => Some(round),
                _ => None,
            })
            .expect("resolved");
        resolved.push(round);
    }
    resolved
}

#[tokio::test]
async fn test_rounds_when_three_peers_gossip_then_every_peer_resolves_the_same_winner() {
    let hub = Arc::new(MemoryTopicHub::new());
    let mut peers = network(&hub, &[1, 2, 3]).await;
    let resolved = run_round(&mut peers).await;

    let first = &resolved[0];
    assert!(first.consensus_hash.is_some());
    for round in &resolved {
        assert_eq!(round.consensus_hash, first.consensus_hash);
        assert_eq!(round.playing_hash(), first.consensus_hash);
        assert!(!round.is_fallback);
        assert_eq!(round.candidate_count, 3);
    }
    for peer in &peers {
        let snapshot = peer.coordinator.snapshot();
        let slot = snapshot.get(TARGET).expect("slot in queue");
        assert_eq!(slot.resolved.as_ref().and_then(|r| r.consensus_hash), first.consensus_hash);
    }
}

#[tokio::test]
async fn test_rounds_when_peer_excluded_everywhere_then_its_proposal_never_wins() {
    let hub = Arc::new(MemoryTopicHub::new());
    let mut peers = network(&hub, &[4, 5, 6]).await;
    let drifter = peers[2].peer_id().clone();
    let excluded: HashSet<PeerId> = [drifter.clone()].into_iter().collect();
    for peer in peers.iter_mut() {
        peer.coordinator.set_excluded(excluded.clone());
    }

    let resolved = run_round(&mut peers).await;
    let winners: HashSet<_> = resolved.iter().map(|r| r.consensus_hash).collect();
    assert_eq!(winners.len(), 1);
    for round in &resolved {
        let winner = round.winner.as_ref().expect("winner");
        assert_ne!(winner.peer_id, drifter);
        assert_eq!(round.candidate_count, 2);
    }
}
