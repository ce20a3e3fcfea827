use crate::domain::coordination::ResolvedRound;
use crate::domain::stream::{ManifestDocument, StreamInfo, StreamState};
use crate::domain::{PeerSyncSnapshot, PinLedgerSnapshot};
use crate::foundation::UnisonError;
use crate::infrastructure::storage::traits::{Result, StateStore};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryInner {
    stream_state: Option<StreamState>,
    pin_ledger: Option<PinLedgerSnapshot>,
    peer_sync: Option<PeerSyncSnapshot>,
    round_history: Vec<ResolvedRound>,
    manifest: Option<(ManifestDocument, String)>,
    stream_info: Option<StreamInfo>,
    stream_state_writes: usize,
}

/// In-process `StateStore`; clones of the same `Arc` model a process restart over the same disk.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| UnisonError::StorageError { operation: "memory state store lock".to_string(), details: "poisoned".to_string() })
    }

    pub fn stream_state_writes(&self) -> usize {
        self.lock_inner().map(|inner| inner.stream_state_writes).unwrap_or_default()
    }

    pub fn last_playlist(&self) -> Option<String> {
        self.lock_inner().ok().and_then(|inner| inner.manifest.as_ref().map(|(_, playlist)| playlist.clone()))
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.lock_inner().ok().and_then(|inner| inner.stream_info.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load_stream_state(&self) -> Result<Option<StreamState>> {
        Ok(self.lock_inner()?.stream_state.clone())
    }

    fn save_stream_state(&self, state: &StreamState) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.stream_state = Some(state.clone());
        inner.stream_state_writes += 1;
        Ok(())
    }

    fn load_pin_ledger(&self) -> Result<Option<PinLedgerSnapshot>> {
        Ok(self.lock_inner()?.pin_ledger.clone())
    }

    fn save_pin_ledger(&self, snapshot: &PinLedgerSnapshot) -> Result<()> {
        self.lock_inner()?.pin_ledger = Some(snapshot.clone());
        Ok(())
    }

    fn load_peer_sync(&self) -> Result<Option<PeerSyncSnapshot>> {
        Ok(self.lock_inner()?.peer_sync.clone())
    }

    fn save_peer_sync(&self, snapshot: &PeerSyncSnapshot) -> Result<()> {
        self.lock_inner()?.peer_sync = Some(snapshot.clone());
        Ok(())
    }

    fn load_round_history(&self) -> Result<Vec<ResolvedRound>> {
        Ok(self.lock_inner()?.round_history.clone())
    }

    fn save_round_history(&self, rounds: &[ResolvedRound]) -> Result<()> {
        self.lock_inner()?.round_history = rounds.to_vec();
        Ok(())
    }

    fn load_manifest(&self) -> Result<Option<ManifestDocument>> {
        Ok(self.lock_inner()?.manifest.as_ref().map(|(doc, _)| doc.clone()))
    }

    fn save_manifest(&self, manifest: &ManifestDocument, playlist: &str) -> Result<()> {
        self.lock_inner()?.manifest = Some((manifest.clone(), playlist.to_string()));
        Ok(())
    }

    fn save_stream_info(&self, info: &StreamInfo) -> Result<()> {
        self.lock_inner()?.stream_info = Some(info.clone());
        Ok(())
    }
}
