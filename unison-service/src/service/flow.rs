use crate::service::metrics::Metrics;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use unison_core::application::{
    playback_report, CatalogSource, ComposerConfig, CoordinatorConfig, DivergenceService, PinRetentionManager, ProposalBuilder,
    RoundCoordinator, StreamComposer,
};
use unison_core::domain::coordination::ResolvedRound;
use unison_core::domain::PlaybackReport;
use unison_core::foundation::{PeerId, RoundId, UnisonError};
use unison_core::infrastructure::config::AppConfig;
use unison_core::infrastructure::storage::StateStore;
use unison_core::infrastructure::store::ContentStore;
use unison_core::infrastructure::transport::{PeerAnnounce, Transport};

/// Everything one peer runs, shared by the service loops.
///
/// The coordinator, builder and divergence service sit behind async mutexes that are never held
/// across network calls.
pub struct ServiceFlow {
    config: Arc<AppConfig>,
    local_peer_id: PeerId,
    transport: Arc<dyn Transport>,
    store: Arc<dyn ContentStore>,
    state: Arc<dyn StateStore>,
    catalog: Arc<dyn CatalogSource>,
    coordinator: Mutex<RoundCoordinator>,
    builder: Mutex<ProposalBuilder>,
    divergence: Mutex<DivergenceService>,
    retention: Arc<PinRetentionManager>,
    metrics: Arc<Metrics>,
    stream_name: watch::Sender<Option<String>>,
}

impl ServiceFlow {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ContentStore>,
        state: Arc<dyn StateStore>,
        catalog: Arc<dyn CatalogSource>,
        now_ns: u64,
    ) -> Result<Self, UnisonError> {
        let local_peer_id = transport.local_peer_id().clone();
        let rounds = &config.rounds;
        let history = state.load_round_history()?;
        let coordinator_config = CoordinatorConfig {
            timing: rounds.timing(),
            history_limit: rounds.history_limit,
            max_early_proposals: rounds.max_early_proposals,
        };
        let mut coordinator = RoundCoordinator::new(coordinator_config, now_ns, history);

        let target_duration_ms = rounds.round_duration_secs.saturating_mul(1_000);
        let mut builder = ProposalBuilder::new(catalog.clone(), rounds.proposal_mode, target_duration_ms, rounds.avoid_recent_rounds);
        for round in coordinator.history() {
            builder.note_resolved(&round);
        }

        let divergence = DivergenceService::new(local_peer_id.clone(), config.divergence.tracker_config(), state.clone())?;
        coordinator.set_excluded(divergence.excluded());

        let retention = PinRetentionManager::new(
            store.clone(),
            state.clone(),
            config.retention.retained_rounds,
            config.retention.gc_every_cycles,
        )?;
        let metrics = Metrics::new()?;
        let (stream_name, _) = watch::channel(None);
        info!(
            "flow: initialized peer_id={} namespace={} proposal_mode={} round_duration_secs={}",
            local_peer_id, config.service.namespace, rounds.proposal_mode, rounds.round_duration_secs
        );
        Ok(Self {
            config,
            local_peer_id,
            transport,
            store,
            state,
            catalog,
            coordinator: Mutex::new(coordinator),
            builder: Mutex::new(builder),
            divergence: Mutex::new(divergence),
            retention: Arc::new(retention),
            metrics: Arc::new(metrics),
            stream_name,
        })
    }

    /// Builds the composer positioned at the coordinator's queue head (or the persisted cursor).
    pub async fn composer(&self, now_ns: u64) -> Result<StreamComposer, UnisonError> {
        let head = self.coordinator.lock().await.snapshot().current_round_id;
        let stream = &self.config.stream;
        let composer_config = ComposerConfig {
            window_segments: stream.window_segments,
            advance_every: stream.advance_every,
            node_label: self.config.service.node_label.clone(),
            name_key: stream.name_key.clone(),
            name_ttl: stream.name_ttl.clone(),
            name_lifetime: stream.name_lifetime.clone(),
            allow_offline: stream.allow_offline,
            bandwidth: stream.bandwidth,
            codecs: stream.codecs.clone(),
            gateway_url: stream.gateway_url.clone(),
        };
        StreamComposer::new(composer_config, self.store.clone(), self.state.clone(), head, now_ns)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn retention(&self) -> Arc<PinRetentionManager> {
        self.retention.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn coordinator(&self) -> &Mutex<RoundCoordinator> {
        &self.coordinator
    }

    pub fn divergence(&self) -> &Mutex<DivergenceService> {
        &self.divergence
    }

    /// Builds the local proposal for `round_id` and broadcasts it when the coordinator asks to.
    pub async fn propose_local(&self, round_id: RoundId, now_ns: u64) -> Result<(), UnisonError> {
        let proposal = self.builder.lock().await.build(round_id, now_ns)?;
        let broadcast = self.coordinator.lock().await.submit_local_proposal(proposal.clone())?;
        if !broadcast {
            debug!("flow: local proposal kept as fallback round_id={} proposal_hash={}", round_id, proposal.proposal_hash);
            return Ok(());
        }
        self.transport.publish_proposal(proposal).await
    }

    /// Recent-track avoidance and history persistence once a round is final. Pinning is left to the caller.
    pub async fn on_round_resolved(&self, round: &ResolvedRound) -> Result<(), UnisonError> {
        self.metrics.inc_round_resolved(round.is_fallback);
        self.builder.lock().await.note_resolved(round);
        let history = self.coordinator.lock().await.history();
        self.state.save_round_history(&history)
    }

    /// This node's report for `round_id`, if the round resolved here.
    pub async fn playback_report(&self, round_id: RoundId) -> Option<PlaybackReport> {
        let round = self.coordinator.lock().await.resolved_round(round_id)?;
        Some(playback_report(&self.local_peer_id, &round))
    }

    pub async fn publish_playback_report(&self, round_id: RoundId) -> Result<(), UnisonError> {
        let Some(report) = self.playback_report(round_id).await else {
            debug!("flow: no resolved round to report round_id={}", round_id);
            return Ok(());
        };
        if report.is_diverged() {
            warn!("flow: playing local fallback instead of consensus round_id={}", round_id);
        }
        self.transport.publish_report(report).await?;
        self.metrics.inc_report_sent();
        Ok(())
    }

    pub async fn publish_announce(&self) -> Result<(), UnisonError> {
        let catalog = self.catalog.get_local_catalog()?;
        let announce = PeerAnnounce {
            peer_id: self.local_peer_id.clone(),
            node_label: self.config.service.node_label.clone(),
            catalog_hash: catalog.catalog_hash,
            track_count: u32::try_from(catalog.len()).unwrap_or(u32::MAX),
            stream_name: self.stream_name.borrow().clone(),
        };
        self.transport.publish_announce(announce).await
    }

    pub fn set_stream_name(&self, name: Option<&str>) {
        self.stream_name.send_if_modified(|current| {
            if current.as_deref() == name {
                return false;
            }
            *current = name.map(str::to_string);
            true
        });
    }

    /// Pushes the divergence service's excluded set into the coordinator.
    pub async fn sync_exclusions(&self) {
        let excluded = self.divergence.lock().await.excluded();
        self.coordinator.lock().await.set_excluded(excluded);
    }
}
