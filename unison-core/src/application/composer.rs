//! Sliding-window stream composer: turns the lookahead queue into the live manifest.
//!
//! The composer is the only writer of [`StreamState`]. Each tick it may advance the cursor,
//! persists any change immediately, and republishes the manifest when its hash changed.

use crate::domain::coordination::QueueSnapshot;
use crate::domain::stream::{
    advance_cursor, compute_window, render_master_playlist, render_media_playlist, CursorMove, ManifestDocument, StreamInfo,
    StreamState, WindowSegment,
};
use crate::foundation::{ContentId, ManifestHash, RoundId, UnisonError};
use crate::infrastructure::storage::StateStore;
use crate::infrastructure::store::ContentStore;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct ComposerConfig {
    pub window_segments: usize,
    pub advance_every: u32,
    pub node_label: String,
    pub name_key: String,
    pub name_ttl: String,
    pub name_lifetime: String,
    pub allow_offline: bool,
    pub bandwidth: u64,
    pub codecs: String,
    pub gateway_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposerTick {
    pub movement: CursorMove,
    pub window_length: usize,
    pub sequence_number: u64,
    pub current_round_id: RoundId,
    /// Hash of the manifest published on this tick, if one was published.
    pub published: Option<ManifestHash>,
}

/// Content the composer is currently serving; the pin manager never releases any of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveWindow {
    /// Round under the cursor. Rounds from here on are still to be played.
    pub playing_round: RoundId,
    pub content_ids: HashSet<ContentId>,
}

pub struct StreamComposer {
    config: ComposerConfig,
    store: Arc<dyn ContentStore>,
    state_store: Arc<dyn StateStore>,
    state: StreamState,
    /// Highest sequence number ever persisted or published. The live sequence must never drop below it.
    sequence_floor: u64,
    ticks: u64,
    stream_name: Option<String>,
    halted: bool,
    window_tx: watch::Sender<ActiveWindow>,
}

impl StreamComposer {
    /// Loads `StreamState` and the last published manifest. A fresh node starts at `head_round`.
    pub fn new(
        config: ComposerConfig,
        store: Arc<dyn ContentStore>,
        state_store: Arc<dyn StateStore>,
        head_round: RoundId,
        now_ns: u64,
    ) -> Result<Self, UnisonError> {
        let last_manifest = state_store.load_manifest()?;
        let mut state = match state_store.load_stream_state()? {
            Some(state) => state,
            None => {
                info!("composer: no persisted stream state, starting round_id={}", head_round);
                StreamState::starting_at(head_round, now_ns)
            }
        };
        let manifest_sequence = last_manifest.as_ref().map(|m| m.sequence_number).unwrap_or_default();
        if state.sequence_number < manifest_sequence {
            warn!(
                "composer: persisted sequence behind last manifest, lifting state_sequence={} manifest_sequence={}",
                state.sequence_number, manifest_sequence
            );
            state.sequence_number = manifest_sequence;
            state.manifest_hash = None;
            state_store.save_stream_state(&state)?;
        }
        let sequence_floor = state.sequence_number;
        info!(
            "composer: restored sequence_number={} round_id={} offset={} window_segments={} advance_every={}",
            state.sequence_number, state.current_round_id, state.window_start_offset, config.window_segments, config.advance_every
        );
        let (window_tx, _) = watch::channel(ActiveWindow { playing_round: state.current_round_id, content_ids: HashSet::new() });
        Ok(Self { config, store, state_store, state, sequence_floor, ticks: 0, stream_name: None, halted: false, window_tx })
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn stream_name(&self) -> Option<&str> {
        self.stream_name.as_deref()
    }

    pub fn subscribe_window(&self) -> watch::Receiver<ActiveWindow> {
        self.window_tx.subscribe()
    }

    pub fn window(&self, snapshot: &QueueSnapshot) -> Vec<WindowSegment> {
        compute_window(snapshot, &self.state, self.config.window_segments)
    }

    /// One composer step. Only `SequenceRegressionDetected` is fatal; after it every tick fails.
    pub async fn tick(&mut self, snapshot: &QueueSnapshot, now_ns: u64) -> Result<ComposerTick, UnisonError> {
        if self.halted {
            return Err(self.regression());
        }
        self.ticks += 1;
        let movement = if self.ticks % u64::from(self.config.advance_every.max(1)) == 0 {
            advance_cursor(snapshot, &mut self.state)
        } else {
            CursorMove::default()
        };
        self.compose(snapshot, movement, now_ns).await
    }

    /// Republishes after a queue mutation without counting as a tick, so the cursor speed stays fixed.
    pub async fn refresh(&mut self, snapshot: &QueueSnapshot, now_ns: u64) -> Result<ComposerTick, UnisonError> {
        if self.halted {
            return Err(self.regression());
        }
        self.compose(snapshot, CursorMove::default(), now_ns).await
    }

    async fn compose(&mut self, snapshot: &QueueSnapshot, movement: CursorMove, now_ns: u64) -> Result<ComposerTick, UnisonError> {
        if movement.changed() {
            self.state.updated_at_ns = now_ns;
            self.state_store.save_stream_state(&self.state)?;
            if movement.jumped {
                info!("composer: cursor jumped to queue head round_id={}", self.state.current_round_id);
            }
            if let Some(round_id) = movement.entered_round {
                debug!("composer: entered round round_id={} sequence_number={}", round_id, self.state.sequence_number);
            }
        }

        if self.state.sequence_number < self.sequence_floor {
            self.halted = true;
            let err = self.regression();
            error!("composer: {}; publishing halted", err);
            return Err(err);
        }

        let window = self.window(snapshot);
        let active = ActiveWindow {
            playing_round: self.state.current_round_id,
            content_ids: window.iter().map(|w| w.segment.content_id.clone()).collect(),
        };
        self.window_tx.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            *current = active;
            true
        });

        let mut outcome = ComposerTick {
            movement,
            window_length: window.len(),
            sequence_number: self.state.sequence_number,
            current_round_id: self.state.current_round_id,
            published: None,
        };
        if window.is_empty() {
            debug!("composer: window empty, nothing to publish round_id={}", self.state.current_round_id);
            return Ok(outcome);
        }

        let stream_name = self.stream_name.clone().unwrap_or_else(|| self.config.name_key.clone());
        let doc = ManifestDocument::build(&stream_name, self.state.sequence_number, self.state.current_round_id, &window, now_ns);
        doc.validate(self.config.window_segments)?;
        // After a restart the name is unknown until published once, even for an unchanged manifest.
        if self.state.manifest_hash == Some(doc.manifest_hash) && self.stream_name.is_some() {
            return Ok(outcome);
        }

        let content_id = self.publish(&doc).await?;
        self.state.manifest_hash = Some(doc.manifest_hash);
        self.state.manifest_content_id = Some(content_id.clone());
        self.state.updated_at_ns = now_ns;
        self.state_store.save_stream_state(&self.state)?;
        self.sequence_floor = self.sequence_floor.max(doc.sequence_number);
        self.state_store.save_manifest(&doc, &render_media_playlist(&doc))?;
        self.state_store.save_stream_info(&self.stream_info(&content_id, window.len(), now_ns))?;
        info!(
            "composer: manifest published sequence_number={} round_id={} segments={} content_id={}",
            doc.sequence_number,
            doc.current_round_id,
            doc.segments.len(),
            content_id
        );
        outcome.published = Some(doc.manifest_hash);
        Ok(outcome)
    }

    /// Adds the manifest to the store and points the mutable name at it.
    async fn publish(&mut self, doc: &ManifestDocument) -> Result<ContentId, UnisonError> {
        let json = serde_json::to_vec(doc)?;
        let content_id = self.store.add(Bytes::from(json)).await.map_err(|err| {
            let err = UnisonError::ManifestPublishFailure { details: format!("add: {err}") };
            warn!("composer: {}; retrying next tick", err);
            err
        })?;
        let config = &self.config;
        let name = self
            .store
            .publish_name(&config.name_key, &content_id, &config.name_ttl, &config.name_lifetime, config.allow_offline)
            .await
            .map_err(|err| {
                let err = UnisonError::ManifestPublishFailure { details: format!("name publish: {err}") };
                warn!("composer: {}; stale manifest stays live, retrying next tick", err);
                err
            })?;
        if self.stream_name.as_deref() != Some(name.as_str()) {
            info!("composer: stream name key={} name={}", self.config.name_key, name);
            self.stream_name = Some(name);
        }
        Ok(content_id)
    }

    fn stream_info(&self, content_id: &ContentId, window_length: usize, now_ns: u64) -> StreamInfo {
        StreamInfo {
            node_label: self.config.node_label.clone(),
            stream_name: self.stream_name.clone(),
            gateway_url: self.config.gateway_url.clone(),
            sequence_number: self.state.sequence_number,
            current_round_id: self.state.current_round_id,
            window_length,
            manifest_content_id: Some(content_id.clone()),
            master_playlist: self
                .stream_name
                .as_deref()
                .map(|name| render_master_playlist(name, self.config.bandwidth, &self.config.codecs)),
            updated_at_ns: now_ns,
        }
    }

    fn regression(&self) -> UnisonError {
        UnisonError::SequenceRegressionDetected { persisted: self.sequence_floor, attempted: self.state.sequence_number }
    }
}
