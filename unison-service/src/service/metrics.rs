use log::debug;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use unison_core::foundation::UnisonError;

/// Text exposition written to the data directory by the status reporter.
pub const METRICS_FILE: &str = "metrics.prom";

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub rounds_resolved: u64,
    pub rounds_fallback: u64,
    pub proposals_accepted: u64,
    pub proposals_rejected: u64,
    pub realization_failures: u64,
    pub manifests_published: u64,
    pub manifest_publish_failures: u64,
    pub reports_sent: u64,
    pub reports_received: u64,
    pub cleanup_unpinned: u64,
}

/// Prometheus registry for the node, plus plain counters for the periodic status reporter.
pub struct Metrics {
    registry: Registry,
    rounds_total: IntCounterVec,
    proposals_total: IntCounterVec,
    realization_failures_total: IntCounter,
    manifest_publishes_total: IntCounterVec,
    playback_reports_total: IntCounterVec,
    cleanup_unpinned_total: IntCounter,
    started_at: Instant,
    rounds_resolved: AtomicU64,
    rounds_fallback: AtomicU64,
    proposals_accepted: AtomicU64,
    proposals_rejected: AtomicU64,
    realization_failures: AtomicU64,
    manifests_published: AtomicU64,
    manifest_publish_failures: AtomicU64,
    reports_sent: AtomicU64,
    reports_received: AtomicU64,
    cleanup_unpinned: AtomicU64,
}

fn metric_err(err: prometheus::Error) -> UnisonError {
    UnisonError::Message(format!("metrics: {err}"))
}

impl Metrics {
    pub fn new() -> Result<Self, UnisonError> {
        debug!("initializing prometheus metrics");
        let registry = Registry::new();
        let rounds_total =
            IntCounterVec::new(prometheus::Opts::new("rounds_total", "Resolved rounds by outcome"), &["outcome"]).map_err(metric_err)?;
        let proposals_total =
            IntCounterVec::new(prometheus::Opts::new("proposals_total", "Peer proposals received"), &["accepted"]).map_err(metric_err)?;
        let realization_failures_total =
            IntCounter::new("realization_failures_total", "Winner content that could not be pinned in time").map_err(metric_err)?;
        let manifest_publishes_total =
            IntCounterVec::new(prometheus::Opts::new("manifest_publishes_total", "Manifest publish attempts by result"), &["result"])
                .map_err(metric_err)?;
        let playback_reports_total =
            IntCounterVec::new(prometheus::Opts::new("playback_reports_total", "Playback reports by direction"), &["direction"])
                .map_err(metric_err)?;
        let cleanup_unpinned_total =
            IntCounter::new("cleanup_unpinned_total", "Content ids released by retention cleanup").map_err(metric_err)?;

        registry.register(Box::new(rounds_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(proposals_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(realization_failures_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(manifest_publishes_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(playback_reports_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(cleanup_unpinned_total.clone())).map_err(metric_err)?;

        let out = Self {
            registry,
            rounds_total,
            proposals_total,
            realization_failures_total,
            manifest_publishes_total,
            playback_reports_total,
            cleanup_unpinned_total,
            started_at: Instant::now(),
            rounds_resolved: AtomicU64::new(0),
            rounds_fallback: AtomicU64::new(0),
            proposals_accepted: AtomicU64::new(0),
            proposals_rejected: AtomicU64::new(0),
            realization_failures: AtomicU64::new(0),
            manifests_published: AtomicU64::new(0),
            manifest_publish_failures: AtomicU64::new(0),
            reports_sent: AtomicU64::new(0),
            reports_received: AtomicU64::new(0),
            cleanup_unpinned: AtomicU64::new(0),
        };
        debug!("prometheus metrics registered metric_count=6");
        Ok(out)
    }

    pub fn inc_round_resolved(&self, is_fallback: bool) {
        let outcome = if is_fallback { "fallback" } else { "consensus" };
        self.rounds_total.with_label_values(&[outcome]).inc();
        self.rounds_resolved.fetch_add(1, Ordering::Relaxed);
        if is_fallback {
            self.rounds_fallback.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_proposal(&self, accepted: bool) {
        let label = if accepted { "true" } else { "false" };
        self.proposals_total.with_label_values(&[label]).inc();
        if accepted {
            self.proposals_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.proposals_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_realization_failure(&self) {
        self.realization_failures_total.inc();
        self.realization_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_manifest_publish(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.manifest_publishes_total.with_label_values(&[result]).inc();
        if ok {
            self.manifests_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.manifest_publish_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_report_sent(&self) {
        self.playback_reports_total.with_label_values(&["sent"]).inc();
        self.reports_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_report_received(&self) {
        self.playback_reports_total.with_label_values(&["received"]).inc();
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cleanup_unpinned(&self, count: u64) {
        self.cleanup_unpinned_total.inc_by(count);
        self.cleanup_unpinned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.started_at.elapsed(),
            rounds_resolved: self.rounds_resolved.load(Ordering::Relaxed),
            rounds_fallback: self.rounds_fallback.load(Ordering::Relaxed),
            proposals_accepted: self.proposals_accepted.load(Ordering::Relaxed),
            proposals_rejected: self.proposals_rejected.load(Ordering::Relaxed),
            realization_failures: self.realization_failures.load(Ordering::Relaxed),
            manifests_published: self.manifests_published.load(Ordering::Relaxed),
            manifest_publish_failures: self.manifest_publish_failures.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_received: self.reports_received.load(Ordering::Relaxed),
            cleanup_unpinned: self.cleanup_unpinned.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of every registered counter.
    pub fn encode(&self) -> Result<String, UnisonError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer).map_err(metric_err)?;
        let output = String::from_utf8(buffer).map_err(|err| UnisonError::Message(err.to_string()))?;
        Ok(output)
    }
}
