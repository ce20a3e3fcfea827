use crate::domain::coordination::ResolvedRound;
use crate::domain::stream::{ManifestDocument, StreamInfo, StreamState};
use crate::domain::{PeerSyncSnapshot, PinLedgerSnapshot};
use crate::foundation::UnisonError;

pub type Result<T> = std::result::Result<T, UnisonError>;

/// Local-only persisted state. Every save replaces the previous value atomically.
pub trait StateStore: Send + Sync {
    fn load_stream_state(&self) -> Result<Option<StreamState>>;
    fn save_stream_state(&self, state: &StreamState) -> Result<()>;

    fn load_pin_ledger(&self) -> Result<Option<PinLedgerSnapshot>>;
    fn save_pin_ledger(&self, snapshot: &PinLedgerSnapshot) -> Result<()>;

    fn load_peer_sync(&self) -> Result<Option<PeerSyncSnapshot>>;
    fn save_peer_sync(&self, snapshot: &PeerSyncSnapshot) -> Result<()>;

    /// Oldest first.
    fn load_round_history(&self) -> Result<Vec<ResolvedRound>>;
    fn save_round_history(&self, rounds: &[ResolvedRound]) -> Result<()>;

    fn load_manifest(&self) -> Result<Option<ManifestDocument>>;
    /// Stores the last published manifest and its HLS rendering side by side.
    fn save_manifest(&self, manifest: &ManifestDocument, playlist: &str) -> Result<()>;

    fn save_stream_info(&self, info: &StreamInfo) -> Result<()>;
}
