use crate::service::flow::ServiceFlow;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use unison_core::application::ActiveWindow;
use unison_core::foundation::UnisonError;

/// Periodic unpin pass. `window_rx` carries the composer's active window and playing round;
/// neither the window nor any round still queued for playback is released.
pub async fn run_retention_loop(flow: Arc<ServiceFlow>, window_rx: watch::Receiver<ActiveWindow>) -> Result<(), UnisonError> {
    let retention = flow.retention();
    let metrics = flow.metrics();
    let interval_secs = flow.config().retention.cleanup_interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("retention_loop: started cleanup_interval_secs={} retained_rounds={}", interval_secs, flow.config().retention.retained_rounds);

    loop {
        ticker.tick().await;
        let active = window_rx.borrow().clone();
        match retention.cleanup(&active.content_ids, active.playing_round).await {
            Ok(report) => {
                metrics.add_cleanup_unpinned(report.unpinned as u64);
                if report.unpinned > 0 || report.unpin_failures > 0 || !report.dropped_rounds.is_empty() {
                    info!(
                        "retention_loop: cleanup unpinned={} unpin_failures={} retried_pins={} dropped_rounds={:?} gc_ran={}",
                        report.unpinned, report.unpin_failures, report.retried_pins, report.dropped_rounds, report.gc_ran
                    );
                } else {
                    debug!(
                        "retention_loop: nothing to release playing_round={} active_window={}",
                        active.playing_round,
                        active.content_ids.len()
                    );
                }
            }
            Err(err) => warn!("retention_loop: cleanup failed error={}", err),
        }
    }
}
