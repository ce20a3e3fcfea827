use crate::domain::coordination::Proposal;
use crate::domain::PlaybackReport;
use crate::foundation::{Hash32, PeerId, RoundId, UnisonError};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

pub use crate::infrastructure::transport::identity::{Ed25519Signer, Ed25519Verifier};
pub use crate::infrastructure::transport::messages::{MessageEnvelope, PeerAnnounce, TransportMessage};

pub type Result<T> = std::result::Result<T, UnisonError>;

pub struct TransportSubscription {
    inner: BoxStream<'static, Result<MessageEnvelope>>,
}

impl TransportSubscription {
    pub fn new(inner: BoxStream<'static, Result<MessageEnvelope>>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Result<MessageEnvelope>> {
        self.inner.next().await
    }
}

pub trait SignatureSigner: Send + Sync {
    fn sender_peer_id(&self) -> &PeerId;
    fn public_key(&self) -> Vec<u8>;
    fn sign(&self, digest: &Hash32) -> Vec<u8>;
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, sender_peer_id: &PeerId, public_key: &[u8], digest: &Hash32, signature: &[u8]) -> bool;
}

#[derive(Clone, Debug)]
pub struct NoopSignatureVerifier;

impl SignatureVerifier for NoopSignatureVerifier {
    fn verify(&self, _sender_peer_id: &PeerId, _public_key: &[u8], _digest: &Hash32, _signature: &[u8]) -> bool {
        true
    }
}

/// Peer gossip: one topic per round for proposals, plus discovery and divergence topics.
#[async_trait]
pub trait Transport: Send + Sync {
    fn local_peer_id(&self) -> &PeerId;
    async fn publish_proposal(&self, proposal: Proposal) -> Result<()>;
    async fn publish_report(&self, report: PlaybackReport) -> Result<()>;
    async fn publish_announce(&self, announce: PeerAnnounce) -> Result<()>;
    async fn subscribe_round(&self, round_id: RoundId) -> Result<TransportSubscription>;
    async fn subscribe_reports(&self) -> Result<TransportSubscription>;
    async fn subscribe_discovery(&self) -> Result<TransportSubscription>;
}
