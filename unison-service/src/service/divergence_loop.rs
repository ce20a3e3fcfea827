use crate::service::flow::ServiceFlow;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use unison_core::foundation::{now_nanos, UnisonError};
use unison_core::infrastructure::transport::{MessageEnvelope, TransportMessage};

/// Divergence reports and discovery announces: inbound bookkeeping plus this node's own periodic broadcasts.
pub async fn run_divergence_loop(flow: Arc<ServiceFlow>) -> Result<(), UnisonError> {
    let transport = flow.transport();
    let mut reports = transport.subscribe_reports().await?;
    let mut discovery = transport.subscribe_discovery().await?;

    let settings = &flow.config().divergence;
    let mut report_ticker = tokio::time::interval(Duration::from_secs(settings.report_interval_secs));
    report_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut announce_ticker = tokio::time::interval(Duration::from_secs(settings.announce_interval_secs));
    announce_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "divergence_loop: started threshold_secs={} peer_ttl_secs={} report_interval_secs={} announce_interval_secs={}",
        settings.threshold_secs, settings.peer_ttl_secs, settings.report_interval_secs, settings.announce_interval_secs
    );

    loop {
        tokio::select! {
            item = reports.next() => {
                let Some(item) = item else {
                    warn!("divergence_loop: report stream ended");
                    break;
                };
                match item {
                    Ok(envelope) => handle_report(&flow, envelope).await,
                    Err(err) => debug!("divergence_loop: dropped report error={}", err),
                }
            }
            item = discovery.next() => {
                let Some(item) = item else {
                    warn!("divergence_loop: discovery stream ended");
                    break;
                };
                match item {
                    Ok(envelope) => handle_announce(&flow, envelope).await,
                    Err(err) => debug!("divergence_loop: dropped announce error={}", err),
                }
            }
            _ = report_ticker.tick() => {
                let changed = flow.divergence().lock().await.refresh(now_nanos());
                match changed {
                    Ok(true) => flow.sync_exclusions().await,
                    Ok(false) => {}
                    Err(err) => warn!("divergence_loop: refresh failed error={}", err),
                }
                let playing_round = flow.coordinator().lock().await.snapshot().current_round_id;
                if let Err(err) = flow.publish_playback_report(playing_round).await {
                    warn!("divergence_loop: periodic report failed round_id={} error={}", playing_round, err);
                }
            }
            _ = announce_ticker.tick() => {
                if let Err(err) = flow.publish_announce().await {
                    warn!("divergence_loop: announce failed error={}", err);
                }
            }
        }
    }
    Ok(())
}

async fn handle_report(flow: &Arc<ServiceFlow>, envelope: MessageEnvelope) {
    let report = match envelope.payload {
        TransportMessage::PlaybackReport(report) => report,
        other => {
            debug!("divergence_loop: unexpected message on report topic kind={}", other.kind());
            return;
        }
    };
    if report.peer_id == *flow.local_peer_id() {
        return;
    }
    flow.metrics().inc_report_received();
    let changed = flow.divergence().lock().await.record_report(&report, now_nanos());
    match changed {
        Ok(true) => flow.sync_exclusions().await,
        Ok(false) => {}
        Err(err) => warn!("divergence_loop: recording report failed peer_id={} error={}", report.peer_id, err),
    }
}

async fn handle_announce(flow: &Arc<ServiceFlow>, envelope: MessageEnvelope) {
    let announce = match envelope.payload {
        TransportMessage::Announce(announce) => announce,
        other => {
            debug!("divergence_loop: unexpected message on discovery topic kind={}", other.kind());
            return;
        }
    };
    if announce.peer_id == *flow.local_peer_id() {
        return;
    }
    debug!(
        "divergence_loop: announce peer_id={} node_label={} tracks={} stream_name={:?}",
        announce.peer_id, announce.node_label, announce.track_count, announce.stream_name
    );
    let track_count = announce.track_count as usize;
    let recorded = flow.divergence().lock().await.record_announce(&announce.peer_id, announce.catalog_hash, track_count, now_nanos());
    if let Err(err) = recorded {
        warn!("divergence_loop: recording announce failed peer_id={} error={}", announce.peer_id, err);
    }
}
