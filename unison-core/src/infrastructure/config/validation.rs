use crate::domain::coordination::config::MIN_QUEUE_DEPTH;
use crate::infrastructure::config::types::AppConfig;

impl AppConfig {
    /// Collects every violation instead of stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.service.namespace.trim().is_empty() {
            errors.push("service.namespace must not be empty".to_string());
        }
        if self.service.namespace.contains('/') {
            errors.push("service.namespace must not contain '/'".to_string());
        }
        if let Some(seed) = self.service.signer_seed_hex.as_deref() {
            let seed = seed.trim().trim_start_matches("0x");
            if seed.len() != 64 || hex::decode(seed).is_err() {
                errors.push("service.signer_seed_hex must be 32 bytes of hex".to_string());
            }
        }

        let rounds = &self.rounds;
        if rounds.round_duration_secs == 0 {
            errors.push("rounds.round_duration_secs must be > 0".to_string());
        }
        if rounds.queue_depth < MIN_QUEUE_DEPTH {
            errors.push(format!("rounds.queue_depth must be >= {MIN_QUEUE_DEPTH}"));
        }
        if rounds.proposing_pct == 0 || rounds.selecting_pct == 0 {
            errors.push("rounds.proposing_pct and rounds.selecting_pct must be > 0".to_string());
        }
        if u16::from(rounds.proposing_pct) + u16::from(rounds.selecting_pct) >= 100 {
            errors.push("rounds.proposing_pct + rounds.selecting_pct must be < 100".to_string());
        }
        if rounds.history_limit < rounds.queue_depth {
            errors.push("rounds.history_limit must be >= rounds.queue_depth".to_string());
        }

        let stream = &self.stream;
        if stream.window_segments == 0 {
            errors.push("stream.window_segments must be > 0".to_string());
        }
        if stream.tick_interval_ms == 0 {
            errors.push("stream.tick_interval_ms must be > 0".to_string());
        }
        if stream.advance_every == 0 {
            errors.push("stream.advance_every must be > 0".to_string());
        }
        if stream.name_key.trim().is_empty() {
            errors.push("stream.name_key must not be empty".to_string());
        }

        if self.retention.retained_rounds == 0 {
            errors.push("retention.retained_rounds must be > 0".to_string());
        }
        if self.retention.cleanup_interval_secs == 0 {
            errors.push("retention.cleanup_interval_secs must be > 0".to_string());
        }

        let divergence = &self.divergence;
        if divergence.threshold_secs == 0 {
            errors.push("divergence.threshold_secs must be > 0".to_string());
        }
        if divergence.peer_ttl_secs <= divergence.threshold_secs {
            errors.push("divergence.peer_ttl_secs must exceed divergence.threshold_secs".to_string());
        }
        if divergence.report_interval_secs == 0 || divergence.announce_interval_secs == 0 {
            errors.push("divergence report/announce intervals must be > 0".to_string());
        }

        if !self.store.api_url.starts_with("http://") && !self.store.api_url.starts_with("https://") {
            errors.push(format!("store.api_url must be an http(s) url: {}", self.store.api_url));
        }
        if self.store.rpc_timeout_ms == 0 {
            errors.push("store.rpc_timeout_ms must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn every_violation_is_reported() {
        let mut config = AppConfig::default();
        config.rounds.round_duration_secs = 0;
        config.rounds.proposing_pct = 70;
        config.stream.window_segments = 0;
        config.retention.retained_rounds = 0;
        config.rounds.queue_depth = 2;
        let errors = config.validate().expect_err("invalid");
        assert_eq!(errors.len(), 5, "{errors:?}");
    }
}
