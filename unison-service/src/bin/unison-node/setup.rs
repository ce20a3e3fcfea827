use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use unison_core::application::FileCatalogSource;
use unison_core::foundation::{PeerId, UnisonError};
use unison_core::infrastructure::config::AppConfig;
use unison_core::infrastructure::logging::init_logger;
use unison_core::infrastructure::storage::JsonStateStore;
use unison_core::infrastructure::store::KuboClient;
use unison_core::infrastructure::transport::{load_or_create_seed, Ed25519Signer, Ed25519Verifier, PubsubTransport, SignatureSigner};

pub fn init_logging(config: &AppConfig, override_filters: Option<&str>) -> Result<(), UnisonError> {
    let filters = override_filters.unwrap_or(&config.logging.filters);
    let log_dir = Some(config.logging.log_dir.trim()).filter(|dir| !dir.is_empty());
    init_logger(log_dir, filters)
}

pub fn load_app_config(profile: Option<&str>) -> Result<Arc<AppConfig>, UnisonError> {
    let config = unison_core::infrastructure::config::load_app_config(None, profile)?;
    Ok(Arc::new(config))
}

pub fn init_store(config: &AppConfig) -> Result<Arc<KuboClient>, UnisonError> {
    let client = KuboClient::new(&config.store.api_url, Duration::from_millis(config.store.rpc_timeout_ms))?;
    info!("store client ready api_url={} rpc_timeout_ms={}", config.store.api_url, config.store.rpc_timeout_ms);
    Ok(Arc::new(client))
}

pub fn init_state(config: &AppConfig) -> Result<Arc<JsonStateStore>, UnisonError> {
    let state = JsonStateStore::open(config.service.data_dir_path())?;
    info!("state store opened dir={}", state.dir().display());
    Ok(Arc::new(state))
}

pub struct NodeIdentity {
    pub peer_id: PeerId,
    pub signer: Arc<Ed25519Signer>,
}

pub fn init_identity(config: &AppConfig) -> Result<NodeIdentity, UnisonError> {
    let seed = load_or_create_seed(config.service.signer_seed_hex.as_deref(), &config.service.data_dir_path())?;
    let signer = Arc::new(Ed25519Signer::from_seed(seed));
    Ok(NodeIdentity { peer_id: signer.sender_peer_id().clone(), signer })
}

pub fn init_transport(config: &AppConfig, store: Arc<KuboClient>, identity: &NodeIdentity) -> Arc<PubsubTransport> {
    Arc::new(PubsubTransport::new(store, identity.signer.clone(), Arc::new(Ed25519Verifier), &config.service.namespace))
}

pub fn init_catalog(config: &AppConfig, peer_id: &PeerId) -> Arc<FileCatalogSource> {
    let path = config.service.catalog_file();
    if !path.exists() {
        warn!("catalog file missing; proposals fail until the chunker writes it path={}", path.display());
    }
    Arc::new(FileCatalogSource::new(path, peer_id.clone()))
}

pub fn log_startup_banner(config: &AppConfig, peer_id: &PeerId) {
    info!(
        "unison-node ready peer_id={} node_label={} namespace={} data_dir={} epoch_secs={} round_duration_secs={} queue_depth={} window_segments={} retained_rounds={}",
        peer_id,
        config.service.node_label,
        config.service.namespace,
        config.service.data_dir,
        config.rounds.epoch_secs,
        config.rounds.round_duration_secs,
        config.rounds.queue_depth,
        config.stream.window_segments,
        config.retention.retained_rounds
    );
}
