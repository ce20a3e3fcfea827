use crate::service::divergence_loop::run_divergence_loop;
use crate::service::flow::ServiceFlow;
use crate::service::metrics::METRICS_FILE;
use crate::service::retention_loop::run_retention_loop;
use crate::service::round_loop::run_round_loop;
use crate::service::stream_loop::run_stream_loop;
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use unison_core::foundation::{now_nanos, UnisonError};

pub const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(300);

/// Runs every service loop until `shutdown` resolves or one of the loops exits.
///
/// A loop exiting is always a stop condition: the stream loop only returns on a sequence regression,
/// the others only when their transport streams close.
pub async fn run_node(flow: Arc<ServiceFlow>, shutdown: impl Future<Output = ()>) -> Result<(), UnisonError> {
    let composer = flow.composer(now_nanos()).await?;
    let window_rx = composer.subscribe_window();

    let mut loops: JoinSet<(&'static str, Result<(), UnisonError>)> = JoinSet::new();
    let f = flow.clone();
    loops.spawn(async move { ("round", run_round_loop(f).await) });
    let f = flow.clone();
    loops.spawn(async move { ("stream", run_stream_loop(f, composer).await) });
    let f = flow.clone();
    loops.spawn(async move { ("retention", run_retention_loop(f, window_rx).await) });
    let f = flow.clone();
    loops.spawn(async move { ("divergence", run_divergence_loop(f).await) });
    let f = flow.clone();
    loops.spawn(async move { ("status", run_status_reporter(f, STATUS_REPORT_INTERVAL).await) });
    info!("node: running peer_id={} loops={}", flow.local_peer_id(), loops.len());

    tokio::pin!(shutdown);
    tokio::select! {
        _ = &mut shutdown => {
            info!("node: shutdown requested");
            Ok(())
        }
        Some(joined) = loops.join_next() => {
            match joined {
                Ok((name, Ok(()))) => {
                    info!("node: loop finished name={}", name);
                    Ok(())
                }
                Ok((name, Err(err))) => {
                    error!("node: loop failed name={} error={}", name, err);
                    Err(err)
                }
                Err(err) => Err(UnisonError::Message(format!("service loop panicked: {err}"))),
            }
        }
    }
}

async fn run_status_reporter(flow: Arc<ServiceFlow>, every: Duration) -> Result<(), UnisonError> {
    let metrics = flow.metrics();
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("status reporter started interval_seconds={}", every.as_secs());
    // First tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let snapshot = metrics.snapshot();
        let queue = flow.coordinator().lock().await.snapshot();
        let resolved_ahead = queue.resolved_run_from(queue.current_round_id).count();
        let (peers, excluded) = {
            let divergence = flow.divergence().lock().await;
            (divergence.peer_count(), divergence.excluded().len())
        };
        info!(
            "periodic status report uptime_minutes={} head_round={} resolved_ahead={} peers={} excluded={} rounds_resolved={} rounds_fallback={} proposals_accepted={} proposals_rejected={} realization_failures={} manifests_published={} manifest_publish_failures={} reports_sent={} reports_received={} cleanup_unpinned={}",
            snapshot.uptime.as_secs() / 60,
            queue.current_round_id,
            resolved_ahead,
            peers,
            excluded,
            snapshot.rounds_resolved,
            snapshot.rounds_fallback,
            snapshot.proposals_accepted,
            snapshot.proposals_rejected,
            snapshot.realization_failures,
            snapshot.manifests_published,
            snapshot.manifest_publish_failures,
            snapshot.reports_sent,
            snapshot.reports_received,
            snapshot.cleanup_unpinned
        );
        write_metrics_file(&flow).await;
    }
}

/// Refreshes the Prometheus text file in the data directory for a node_exporter textfile collector.
async fn write_metrics_file(flow: &ServiceFlow) {
    let path = flow.config().service.data_dir_path().join(METRICS_FILE);
    let text = match flow.metrics().encode() {
        Ok(text) => text,
        Err(err) => {
            warn!("status: metrics encode failed error={}", err);
            return;
        }
    };
    if let Err(err) = tokio::fs::write(&path, text).await {
        warn!("status: metrics file write failed path={} error={}", path.display(), err);
    }
}
