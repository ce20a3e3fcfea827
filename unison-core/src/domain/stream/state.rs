use crate::foundation::{ContentId, ManifestHash, RoundId};
use serde::{Deserialize, Serialize};

/// Composer cursor and publish bookkeeping, persisted as `stream_state.json` after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    /// Count of segments that have ever left the trailing edge of the window. Never decreases.
    pub sequence_number: u64,
    pub current_round_id: RoundId,
    /// Segment offset into `current_round_id`'s content.
    pub window_start_offset: u32,
    pub manifest_hash: Option<ManifestHash>,
    #[serde(default)]
    pub manifest_content_id: Option<ContentId>,
    pub updated_at_ns: u64,
}

impl StreamState {
    pub fn starting_at(round_id: RoundId, now_ns: u64) -> Self {
        Self { current_round_id: round_id, updated_at_ns: now_ns, ..Default::default() }
    }
}

/// Observability snapshot written as `stream_info.json` after each publish.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub node_label: String,
    /// Mutable name the manifest is published under, once known.
    pub stream_name: Option<String>,
    pub gateway_url: String,
    pub sequence_number: u64,
    pub current_round_id: RoundId,
    pub window_length: usize,
    pub manifest_content_id: Option<ContentId>,
    /// Master playlist pointing at `stream_name`, rendered once the name is known.
    #[serde(default)]
    pub master_playlist: Option<String>,
    pub updated_at_ns: u64,
}
