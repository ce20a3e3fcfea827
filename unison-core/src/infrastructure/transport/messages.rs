use crate::domain::coordination::Proposal;
use crate::domain::PlaybackReport;
use crate::foundation::{CatalogHash, PayloadHash, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageEnvelope {
    pub sender_peer_id: PeerId,
    /// Raw ed25519 verifying key; its hex form is the sender's peer id.
    pub sender_pubkey: Vec<u8>,
    pub seq_no: u64,
    pub timestamp_nanos: u64,
    pub payload: TransportMessage,
    pub payload_hash: PayloadHash,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum TransportMessage {
    /// Round candidate, published on `<ns>/round/<id>`.
    Proposal(Proposal),
    /// Periodic consensus-vs-playing report, published on `<ns>/divergence`.
    PlaybackReport(PlaybackReport),
    /// Liveness and catalog summary, published on `<ns>/discovery`.
    Announce(PeerAnnounce),
}

impl TransportMessage {
    /// Peer the payload claims to speak for; must equal the envelope sender.
    pub fn origin_peer_id(&self) -> &PeerId {
        match self {
            TransportMessage::Proposal(proposal) => &proposal.peer_id,
            TransportMessage::PlaybackReport(report) => &report.peer_id,
            TransportMessage::Announce(announce) => &announce.peer_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportMessage::Proposal(_) => "proposal",
            TransportMessage::PlaybackReport(_) => "playback_report",
            TransportMessage::Announce(_) => "announce",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeerAnnounce {
    pub peer_id: PeerId,
    pub node_label: String,
    pub catalog_hash: CatalogHash,
    pub track_count: u32,
    /// Mutable name the peer publishes its live manifest under, once known.
    pub stream_name: Option<String>,
}
