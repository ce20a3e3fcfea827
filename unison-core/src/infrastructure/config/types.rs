use crate::domain::coordination::config::{
    DEFAULT_GRACE_PERIOD_SECS, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_EARLY_PROPOSALS, DEFAULT_PROPOSING_PCT, DEFAULT_ROUND_DURATION_SECS,
    DEFAULT_SELECTING_PCT,
};
use crate::domain::coordination::{ProposalMode, RoundTimingConfig};
use crate::domain::DivergenceConfig;
use crate::foundation::constants::{DEFAULT_QUEUE_DEPTH, DEFAULT_RETAINED_ROUNDS, DEFAULT_WINDOW_SEGMENTS, NANOS_PER_SECOND};
use figment::value::{Dict, Map};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "unison";
pub const DEFAULT_CATALOG_FILE: &str = "catalog.json";
pub const DEFAULT_STORE_API_URL: &str = "http://127.0.0.1:5001";
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory for persisted state, identity key and default catalog path.
    pub data_dir: String,
    /// Topic prefix; peers only hear each other within the same namespace.
    pub namespace: String,
    pub node_label: String,
    /// Chunker catalog JSON. Empty means `<data_dir>/catalog.json`.
    pub catalog_path: String,
    /// Hex ed25519 seed. When unset a key is generated once and stored in the data dir.
    pub signer_seed_hex: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            node_label: "unison-node".to_string(),
            catalog_path: String::new(),
            signer_seed_hex: None,
        }
    }
}

impl ServiceConfig {
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(self.data_dir.trim())
    }

    pub fn catalog_file(&self) -> PathBuf {
        match self.catalog_path.trim() {
            "" => self.data_dir_path().join(DEFAULT_CATALOG_FILE),
            path => PathBuf::from(path),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    /// Unix seconds of round 0. Must match across peers.
    pub epoch_secs: u64,
    pub round_duration_secs: u64,
    pub queue_depth: usize,
    pub proposing_pct: u8,
    pub selecting_pct: u8,
    pub grace_period_secs: u64,
    pub proposal_mode: ProposalMode,
    /// Resolved rounds kept in memory and in `round_history.json`.
    pub history_limit: usize,
    pub max_early_proposals: usize,
    /// Recent winners the proposal builder tries not to repeat.
    pub avoid_recent_rounds: usize,
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            epoch_secs: 0,
            round_duration_secs: DEFAULT_ROUND_DURATION_SECS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            proposing_pct: DEFAULT_PROPOSING_PCT,
            selecting_pct: DEFAULT_SELECTING_PCT,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            proposal_mode: ProposalMode::SingleTrack,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_early_proposals: DEFAULT_MAX_EARLY_PROPOSALS,
            avoid_recent_rounds: 8,
        }
    }
}

impl RoundsConfig {
    pub fn timing(&self) -> RoundTimingConfig {
        RoundTimingConfig {
            epoch_ns: self.epoch_secs.saturating_mul(NANOS_PER_SECOND),
            round_duration_ns: self.round_duration_secs.saturating_mul(NANOS_PER_SECOND),
            queue_depth: self.queue_depth,
            proposing_pct: self.proposing_pct,
            selecting_pct: self.selecting_pct,
            grace_period_ns: self.grace_period_secs.saturating_mul(NANOS_PER_SECOND),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub window_segments: usize,
    pub tick_interval_ms: u64,
    /// Ticks per one-segment advance.
    pub advance_every: u32,
    /// Key used for the mutable-name publish (`self` is the node key).
    pub name_key: String,
    pub name_ttl: String,
    pub name_lifetime: String,
    pub allow_offline: bool,
    pub bandwidth: u64,
    pub codecs: String,
    pub gateway_url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_segments: DEFAULT_WINDOW_SEGMENTS,
            tick_interval_ms: 2_000,
            advance_every: 3,
            name_key: "self".to_string(),
            name_ttl: "1m".to_string(),
            name_lifetime: "24h".to_string(),
            allow_offline: true,
            bandwidth: 128_000,
            codecs: "mp4a.40.2".to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub retained_rounds: usize,
    pub cleanup_interval_secs: u64,
    /// Store GC runs every N cleanup passes; 0 disables it.
    pub gc_every_cycles: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { retained_rounds: DEFAULT_RETAINED_ROUNDS, cleanup_interval_secs: 30, gc_every_cycles: 20 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceSettings {
    pub threshold_secs: u64,
    pub peer_ttl_secs: u64,
    pub report_interval_secs: u64,
    pub announce_interval_secs: u64,
}

impl Default for DivergenceSettings {
    fn default() -> Self {
        let defaults = DivergenceConfig::default();
        Self {
            threshold_secs: defaults.threshold_ns / NANOS_PER_SECOND,
            peer_ttl_secs: defaults.peer_ttl_ns / NANOS_PER_SECOND,
            report_interval_secs: 60,
            announce_interval_secs: 60,
        }
    }
}

impl DivergenceSettings {
    pub fn tracker_config(&self) -> DivergenceConfig {
        DivergenceConfig {
            threshold_ns: self.threshold_secs.saturating_mul(NANOS_PER_SECOND),
            peer_ttl_ns: self.peer_ttl_secs.saturating_mul(NANOS_PER_SECOND),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub api_url: String,
    /// Per-call timeout for store RPCs.
    pub rpc_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { api_url: DEFAULT_STORE_API_URL.to_string(), rpc_timeout_ms: 10_000 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filters: String,
    /// Empty disables file logging.
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filters: "info".to_string(), log_dir: String::new() }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub rounds: RoundsConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub divergence: DivergenceSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// `[profiles.<name>]` tables merged over the base file when a profile is selected.
    #[serde(default, skip_serializing)]
    pub profiles: Option<Map<String, Dict>>,
}
