use crate::service::flow::ServiceFlow;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use unison_core::application::StreamComposer;
use unison_core::foundation::{now_nanos, UnisonError};

/// Ticks the composer on its fixed cadence and republishes whenever the lookahead queue changes.
///
/// Returns only on a fatal composer error (sequence regression) or when the coordinator is gone.
pub async fn run_stream_loop(flow: Arc<ServiceFlow>, mut composer: StreamComposer) -> Result<(), UnisonError> {
    let metrics = flow.metrics();
    let mut snapshot_rx = flow.coordinator().lock().await.subscribe();
    let tick_interval_ms = flow.config().stream.tick_interval_ms;
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "stream_loop: started tick_interval_ms={} sequence_number={} round_id={}",
        tick_interval_ms,
        composer.state().sequence_number,
        composer.state().current_round_id
    );

    loop {
        let queue_changed = tokio::select! {
            _ = ticker.tick() => false,
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    warn!("stream_loop: queue snapshot channel closed");
                    break;
                }
                true
            }
        };
        let snapshot = snapshot_rx.borrow_and_update().clone();
        let now = now_nanos();
        let result = if queue_changed { composer.refresh(&snapshot, now).await } else { composer.tick(&snapshot, now).await };
        let tick = match result {
            Ok(tick) => tick,
            Err(err) if err.is_fatal() => {
                error!("stream_loop: stopping error={}", err);
                return Err(err);
            }
            Err(err) => {
                if matches!(err, UnisonError::ManifestPublishFailure { .. }) {
                    metrics.inc_manifest_publish(false);
                }
                warn!("stream_loop: compose failed, retrying next tick error={}", err);
                continue;
            }
        };

        if let Some(round_id) = tick.movement.entered_round {
            flow.coordinator().lock().await.on_playback_round(round_id);
            if let Err(err) = flow.publish_playback_report(round_id).await {
                warn!("stream_loop: playback report failed round_id={} error={}", round_id, err);
            }
        }
        if tick.published.is_some() {
            metrics.inc_manifest_publish(true);
            flow.set_stream_name(composer.stream_name());
        }
    }
    Ok(())
}
