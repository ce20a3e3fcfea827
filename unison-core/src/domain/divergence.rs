use crate::foundation::constants::{DEFAULT_DIVERGENCE_THRESHOLD_NS, NANOS_PER_SECOND};
use crate::foundation::{CatalogHash, PeerId, ProposalHash, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DEFAULT_PEER_TTL_NS: u64 = 1_800 * NANOS_PER_SECOND;

/// `{round_id, consensus_winner_hash, actually_playing_hash}` as broadcast by a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackReport {
    pub peer_id: PeerId,
    pub round_id: RoundId,
    pub consensus_winner_hash: Option<ProposalHash>,
    pub actually_playing_hash: Option<ProposalHash>,
}

impl PlaybackReport {
    /// A round without a consensus winner cannot be diverged from.
    pub fn is_diverged(&self) -> bool {
        match (&self.consensus_winner_hash, &self.actually_playing_hash) {
            (Some(consensus), playing) => Some(consensus) != playing.as_ref(),
            (None, _) => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSyncState {
    pub round_id: RoundId,
    pub reported_playing_hash: Option<ProposalHash>,
    pub consensus_hash: Option<ProposalHash>,
    pub diverged: bool,
    pub divergence_started_at_ns: Option<u64>,
    pub last_seen_ns: u64,
    #[serde(default)]
    pub catalog_hash: Option<CatalogHash>,
    #[serde(default)]
    pub track_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceConfig {
    pub threshold_ns: u64,
    pub peer_ttl_ns: u64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self { threshold_ns: DEFAULT_DIVERGENCE_THRESHOLD_NS, peer_ttl_ns: DEFAULT_PEER_TTL_NS }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExclusionChange {
    Unchanged,
    Excluded,
    Rejoined,
}

/// Serializable form persisted as `peer_sync.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSyncSnapshot {
    pub peers: BTreeMap<PeerId, PeerSyncState>,
    pub excluded: BTreeSet<PeerId>,
}

/// Local view of which peers play something other than what they agreed on.
#[derive(Clone, Debug, Default)]
pub struct DivergenceTracker {
    config: DivergenceConfig,
    peers: BTreeMap<PeerId, PeerSyncState>,
    excluded: BTreeSet<PeerId>,
}

impl DivergenceTracker {
    pub fn new(config: DivergenceConfig) -> Self {
        Self { config, peers: BTreeMap::new(), excluded: BTreeSet::new() }
    }

    pub fn restore(config: DivergenceConfig, snapshot: PeerSyncSnapshot) -> Self {
        Self { config, peers: snapshot.peers, excluded: snapshot.excluded }
    }

    pub fn snapshot(&self) -> PeerSyncSnapshot {
        PeerSyncSnapshot { peers: self.peers.clone(), excluded: self.excluded.clone() }
    }

    pub fn record_report(&mut self, report: &PlaybackReport, now_ns: u64) -> ExclusionChange {
        let diverged = report.is_diverged();
        let state = self.peers.entry(report.peer_id.clone()).or_default();
        state.round_id = report.round_id;
        state.reported_playing_hash = report.actually_playing_hash;
        state.consensus_hash = report.consensus_winner_hash;
        state.last_seen_ns = now_ns;
        state.diverged = diverged;

        if !diverged {
            state.divergence_started_at_ns = None;
            return if self.excluded.remove(&report.peer_id) { ExclusionChange::Rejoined } else { ExclusionChange::Unchanged };
        }

        let started = *state.divergence_started_at_ns.get_or_insert(now_ns);
        if now_ns.saturating_sub(started) > self.config.threshold_ns && self.excluded.insert(report.peer_id.clone()) {
            return ExclusionChange::Excluded;
        }
        ExclusionChange::Unchanged
    }

    pub fn record_announce(&mut self, peer_id: &PeerId, catalog_hash: CatalogHash, track_count: usize, now_ns: u64) {
        let state = self.peers.entry(peer_id.clone()).or_default();
        state.catalog_hash = Some(catalog_hash);
        state.track_count = track_count;
        state.last_seen_ns = now_ns;
    }

    /// Excludes peers whose divergence streak passed the threshold without a new report. Returns newly excluded peers.
    pub fn refresh_exclusions(&mut self, now_ns: u64) -> Vec<PeerId> {
        let threshold = self.config.threshold_ns;
        let mut newly = Vec::new();
        for (peer_id, state) in &self.peers {
            let Some(started) = state.divergence_started_at_ns else { continue };
            if state.diverged && now_ns.saturating_sub(started) > threshold && self.excluded.insert(peer_id.clone()) {
                newly.push(peer_id.clone());
            }
        }
        newly
    }

    /// Drops peers not heard from within the TTL, including their exclusion entry.
    pub fn evict_stale(&mut self, now_ns: u64) -> Vec<PeerId> {
        let ttl = self.config.peer_ttl_ns;
        let stale: Vec<PeerId> =
            self.peers.iter().filter(|(_, s)| now_ns.saturating_sub(s.last_seen_ns) > ttl).map(|(p, _)| p.clone()).collect();
        for peer_id in &stale {
            self.peers.remove(peer_id);
            self.excluded.remove(peer_id);
        }
        stale
    }

    pub fn is_excluded(&self, peer_id: &PeerId) -> bool {
        self.excluded.contains(peer_id)
    }

    pub fn excluded(&self) -> HashSet<PeerId> {
        self.excluded.iter().cloned().collect()
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerSyncState> {
        self.peers.get(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
