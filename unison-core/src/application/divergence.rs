//! Divergence service: the tracker plus persistence and the local side of playback reporting.

use crate::domain::coordination::ResolvedRound;
use crate::domain::{DivergenceConfig, DivergenceTracker, ExclusionChange, PeerSyncState, PlaybackReport};
use crate::foundation::{CatalogHash, PeerId, UnisonError};
use crate::infrastructure::storage::StateStore;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// What this node reports about a round it is playing.
pub fn playback_report(local_peer_id: &PeerId, round: &ResolvedRound) -> PlaybackReport {
    PlaybackReport {
        peer_id: local_peer_id.clone(),
        round_id: round.round_id,
        consensus_winner_hash: round.consensus_hash,
        actually_playing_hash: round.playing_hash(),
    }
}

pub struct DivergenceService {
    local_peer_id: PeerId,
    tracker: DivergenceTracker,
    state: Arc<dyn StateStore>,
}

impl DivergenceService {
    /// Restores `peer_sync.json`, so exclusions survive a restart.
    pub fn new(local_peer_id: PeerId, config: DivergenceConfig, state: Arc<dyn StateStore>) -> Result<Self, UnisonError> {
        let tracker = match state.load_peer_sync()? {
            Some(snapshot) => DivergenceTracker::restore(config, snapshot),
            None => DivergenceTracker::new(config),
        };
        info!("divergence: restored peers={} excluded={}", tracker.peer_count(), tracker.excluded().len());
        Ok(Self { local_peer_id, tracker, state })
    }

    fn persist(&self) -> Result<(), UnisonError> {
        self.state.save_peer_sync(&self.tracker.snapshot())
    }

    /// Applies a peer report. Returns true when the excluded set changed.
    pub fn record_report(&mut self, report: &PlaybackReport, now_ns: u64) -> Result<bool, UnisonError> {
        if report.peer_id == self.local_peer_id {
            return Ok(false);
        }
        let change = self.tracker.record_report(report, now_ns);
        match change {
            ExclusionChange::Excluded => warn!(
                "divergence: peer excluded peer_id={} round_id={} threshold_exceeded=true",
                report.peer_id, report.round_id
            ),
            ExclusionChange::Rejoined => info!("divergence: peer rejoined peer_id={} round_id={}", report.peer_id, report.round_id),
            ExclusionChange::Unchanged => {
                debug!("divergence: report peer_id={} round_id={} diverged={}", report.peer_id, report.round_id, report.is_diverged())
            }
        }
        self.persist()?;
        Ok(change != ExclusionChange::Unchanged)
    }

    pub fn record_announce(&mut self, peer_id: &PeerId, catalog_hash: CatalogHash, track_count: usize, now_ns: u64) -> Result<(), UnisonError> {
        if *peer_id == self.local_peer_id {
            return Ok(());
        }
        if self.tracker.peer(peer_id).is_none() {
            info!("divergence: peer discovered peer_id={} tracks={}", peer_id, track_count);
        }
        self.tracker.record_announce(peer_id, catalog_hash, track_count, now_ns);
        self.persist()
    }

    /// Excludes silent diverged peers and evicts peers past the TTL. Returns true when the excluded set changed.
    pub fn refresh(&mut self, now_ns: u64) -> Result<bool, UnisonError> {
        let before = self.tracker.excluded();
        for peer_id in self.tracker.refresh_exclusions(now_ns) {
            warn!("divergence: peer excluded peer_id={} reason=silent_divergence", peer_id);
        }
        let evicted = self.tracker.evict_stale(now_ns);
        if !evicted.is_empty() {
            info!("divergence: evicted stale peers count={} peers={:?}", evicted.len(), evicted);
        }
        self.persist()?;
        Ok(self.tracker.excluded() != before)
    }

    pub fn excluded(&self) -> HashSet<PeerId> {
        self.tracker.excluded()
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerSyncState> {
        self.tracker.peer(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.tracker.peer_count()
    }
}
