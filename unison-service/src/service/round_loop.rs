use crate::service::flow::ServiceFlow;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use unison_core::application::CoordinatorAction;
use unison_core::domain::coordination::Proposal;
use unison_core::foundation::{now_nanos, RoundId, UnisonError};
use unison_core::infrastructure::transport::TransportMessage;

pub const ROUND_TICK_INTERVAL: Duration = Duration::from_millis(500);

type Realized = (RoundId, Result<(), UnisonError>);

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives the round coordinator: phase ticks, inbound proposals and realization results.
///
/// Each open round (plus the next one, so early proposals are buffered) gets its own topic
/// subscription task. Subscriptions are dropped once the coordinator stops tracking the round.
pub async fn run_round_loop(flow: Arc<ServiceFlow>) -> Result<(), UnisonError> {
    let (proposal_tx, mut proposal_rx) = mpsc::channel::<Proposal>(256);
    let (realized_tx, mut realized_rx) = mpsc::channel::<Realized>(64);
    let mut subscriptions: HashMap<RoundId, AbortOnDrop> = HashMap::new();
    let metrics = flow.metrics();

    let mut ticker = tokio::time::interval(ROUND_TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "round_loop: started peer_id={} round_duration_secs={} queue_depth={}",
        flow.local_peer_id(),
        flow.config().rounds.round_duration_secs,
        flow.config().rounds.queue_depth
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = now_nanos();
                let (actions, wanted) = {
                    let mut coordinator = flow.coordinator().lock().await;
                    let actions = coordinator.tick(now);
                    let mut wanted: HashSet<RoundId> = coordinator.active_rounds().collect();
                    wanted.insert(coordinator.clock().newest_open_round(now).saturating_add(1));
                    (actions, wanted)
                };
                sync_subscriptions(&flow, &mut subscriptions, &wanted, &proposal_tx).await;
                handle_actions(&flow, actions, &realized_tx).await;
            }
            Some(proposal) = proposal_rx.recv() => {
                let round_id = proposal.round_id;
                let peer_id = proposal.peer_id.clone();
                let outcome = flow.coordinator().lock().await.on_proposal(proposal, now_nanos());
                match outcome {
                    Ok(outcome) => {
                        metrics.inc_proposal(outcome.is_accepted());
                        debug!("round_loop: proposal round_id={} peer_id={} outcome={:?}", round_id, peer_id, outcome);
                    }
                    Err(err) => {
                        metrics.inc_proposal(false);
                        debug!("round_loop: proposal rejected round_id={} peer_id={} error={}", round_id, peer_id, err);
                    }
                }
            }
            Some((round_id, result)) = realized_rx.recv() => {
                if let Err(err) = &result {
                    metrics.inc_realization_failure();
                    warn!("round_loop: realization failed round_id={} error={}", round_id, err);
                }
                let actions = flow.coordinator().lock().await.on_realization(round_id, result, now_nanos());
                handle_actions(&flow, actions, &realized_tx).await;
            }
        }
    }
}

async fn sync_subscriptions(
    flow: &Arc<ServiceFlow>,
    subscriptions: &mut HashMap<RoundId, AbortOnDrop>,
    wanted: &HashSet<RoundId>,
    proposal_tx: &mpsc::Sender<Proposal>,
) {
    subscriptions.retain(|round_id, _| wanted.contains(round_id));
    for &round_id in wanted {
        if subscriptions.contains_key(&round_id) {
            continue;
        }
        match subscribe_round(flow, round_id, proposal_tx.clone()).await {
            Ok(guard) => {
                debug!("round_loop: subscribed round_id={}", round_id);
                subscriptions.insert(round_id, guard);
            }
            Err(err) => warn!("round_loop: subscribe failed round_id={} error={}", round_id, err),
        }
    }
}

async fn subscribe_round(flow: &Arc<ServiceFlow>, round_id: RoundId, tx: mpsc::Sender<Proposal>) -> Result<AbortOnDrop, UnisonError> {
    let mut subscription = flow.transport().subscribe_round(round_id).await?;
    let handle = tokio::spawn(async move {
        while let Some(item) = subscription.next().await {
            let envelope = match item {
                Ok(envelope) => envelope,
                Err(err) => {
                    debug!("round_loop: dropped message round_id={} error={}", round_id, err);
                    continue;
                }
            };
            match envelope.payload {
                TransportMessage::Proposal(proposal) => {
                    if tx.send(proposal).await.is_err() {
                        break;
                    }
                }
                other => debug!("round_loop: unexpected message round_id={} kind={}", round_id, other.kind()),
            }
        }
    });
    Ok(AbortOnDrop(handle))
}

async fn handle_actions(flow: &Arc<ServiceFlow>, actions: Vec<CoordinatorAction>, realized_tx: &mpsc::Sender<Realized>) {
    for action in actions {
        match action {
            CoordinatorAction::NeedLocalProposal { round_id, broadcast } => {
                if let Err(err) = flow.propose_local(round_id, now_nanos()).await {
                    warn!("round_loop: local proposal failed round_id={} broadcast={} error={}", round_id, broadcast, err);
                }
            }
            CoordinatorAction::StartRealization { round_id, content_ids, deadline_ns } => {
                let retention = flow.retention();
                let tx = realized_tx.clone();
                tokio::spawn(async move {
                    let result = retention.realize(round_id, &content_ids, deadline_ns, now_nanos()).await;
                    let _ = tx.send((round_id, result)).await;
                });
            }
            CoordinatorAction::RoundResolved(round) => {
                info!(
                    "round_loop: resolved round_id={} fallback={} candidates={} winner={}",
                    round.round_id,
                    round.is_fallback,
                    round.candidate_count,
                    round.playing_hash().map(|h| h.to_string()).unwrap_or_else(|| "none".to_string())
                );
                if let Err(err) = flow.on_round_resolved(&round).await {
                    warn!("round_loop: persisting resolved round failed round_id={} error={}", round.round_id, err);
                }
                let retention = flow.retention();
                tokio::spawn(async move {
                    if let Err(err) = retention.on_round_resolved(&round, now_nanos()).await {
                        warn!("round_loop: pinning resolved round failed round_id={} error={}", round.round_id, err);
                    }
                });
            }
        }
    }
}
