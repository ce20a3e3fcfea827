#![allow(dead_code)]

use std::sync::Arc;
use unison_core::application::StaticCatalogSource;
use unison_core::domain::{Catalog, SegmentRef, Track};
use unison_core::foundation::{ContentId, PeerId, TrackId, NANOS_PER_SECOND};
use unison_core::infrastructure::config::AppConfig;
use unison_core::infrastructure::storage::MemoryStateStore;
use unison_core::infrastructure::store::{MemoryContentStore, MemoryTopicHub};
use unison_core::infrastructure::transport::{Ed25519Signer, Ed25519Verifier, PubsubTransport, Transport};
use unison_service::service::ServiceFlow;

pub const S: u64 = NANOS_PER_SECOND;
pub const ROUND_SECS: u64 = 60;
pub const NAMESPACE: &str = "unison-service-test";

/// One second into round 10; with depth 5 round 13 is the one still accepting proposals.
pub const NOW: u64 = 10 * ROUND_SECS * S + S;
pub const TARGET: u64 = 13;

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.service.namespace = NAMESPACE.to_string();
    config.service.node_label = "harness".to_string();
    config.rounds.round_duration_secs = ROUND_SECS;
    config.rounds.queue_depth = 5;
    config
}

pub fn local_catalog(peer: &PeerId, track: &str, segments: u32) -> Catalog {
    let track_id = TrackId::from(track);
    let segments = (0..segments)
        .map(|i| SegmentRef {
            track_id: track_id.clone(),
            segment_index: i,
            content_id: ContentId::new(format!("{track}-s{i}")),
            duration_ms: 6_000,
        })
        .collect();
    Catalog::new(peer.clone(), vec![Track { track_id, title: None, segments }])
}

pub fn transport(hub: &Arc<MemoryTopicHub>, seed: u8) -> Arc<PubsubTransport> {
    let signer = Arc::new(Ed25519Signer::from_seed([seed; 32]));
    Arc::new(PubsubTransport::new(hub.clone(), signer, Arc::new(Ed25519Verifier), NAMESPACE))
}

pub struct TestPeer {
    pub flow: Arc<ServiceFlow>,
    pub transport: Arc<PubsubTransport>,
    pub state: Arc<MemoryStateStore>,
}

impl TestPeer {
    pub fn peer_id(&self) -> &PeerId {
        self.transport.local_peer_id()
    }
}

/// Peer sharing `hub` and `store` with the rest of the test network.
pub fn peer(hub: &Arc<MemoryTopicHub>, store: &Arc<MemoryContentStore>, seed: u8, now_ns: u64) -> TestPeer {
    let transport = transport(hub, seed);
    let catalog = local_catalog(transport.local_peer_id(), &format!("track-{seed}"), 12);
    let state = Arc::new(MemoryStateStore::new());
    let flow = ServiceFlow::new(
        Arc::new(test_config()),
        transport.clone(),
        store.clone(),
        state.clone(),
        Arc::new(StaticCatalogSource::new(catalog)),
        now_ns,
    )
    .expect("flow");
    TestPeer { flow: Arc::new(flow), transport, state }
}
