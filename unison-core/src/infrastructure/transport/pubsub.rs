use super::encoding;
use super::filtering::{filter_stream, SeenMessages};
use super::traits::{
    MessageEnvelope, PeerAnnounce, SignatureSigner, SignatureVerifier, Transport, TransportMessage, TransportSubscription,
};
use crate::domain::coordination::Proposal;
use crate::domain::PlaybackReport;
use crate::foundation::{now_nanos, PeerId, RoundId, UnisonError, MAX_MESSAGE_SIZE_BYTES};
use crate::infrastructure::store::TopicBus;
use async_trait::async_trait;
use log::{debug, info, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub fn discovery_topic(namespace: &str) -> String {
    format!("{namespace}/discovery")
}

pub fn round_topic(namespace: &str, round_id: RoundId) -> String {
    format!("{namespace}/round/{round_id}")
}

pub fn divergence_topic(namespace: &str) -> String {
    format!("{namespace}/divergence")
}

/// Signed envelopes over a string-topic pubsub bus (the store's pubsub in production).
pub struct PubsubTransport {
    bus: Arc<dyn TopicBus>,
    signer: Arc<dyn SignatureSigner>,
    verifier: Arc<dyn SignatureVerifier>,
    seen: Arc<SeenMessages>,
    namespace: String,
    seq: AtomicU64,
}

impl PubsubTransport {
    pub fn new(bus: Arc<dyn TopicBus>, signer: Arc<dyn SignatureSigner>, verifier: Arc<dyn SignatureVerifier>, namespace: &str) -> Self {
        info!("creating pubsub transport namespace={} peer_id={}", namespace, signer.sender_peer_id());
        // Clock-seeded so a restarted node never reuses a (sender, seq_no) pair peers still remember.
        let seq = AtomicU64::new(now_nanos().max(1));
        Self { bus, signer, verifier, seen: Arc::new(SeenMessages::new()), namespace: namespace.to_string(), seq }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn envelope(&self, payload: TransportMessage) -> Result<MessageEnvelope, UnisonError> {
        let payload_hash = encoding::payload_hash(&payload)?;
        let sender_peer_id = self.signer.sender_peer_id().clone();
        let seq_no = self.seq.fetch_add(1, Ordering::AcqRel);
        let timestamp_nanos = now_nanos();
        let digest = encoding::signing_digest(&sender_peer_id, seq_no, timestamp_nanos, &payload_hash);
        Ok(MessageEnvelope {
            sender_peer_id,
            sender_pubkey: self.signer.public_key(),
            seq_no,
            timestamp_nanos,
            payload,
            payload_hash,
            signature: self.signer.sign(&digest),
        })
    }

    async fn publish(&self, topic: String, payload: TransportMessage) -> Result<(), UnisonError> {
        let kind = payload.kind();
        let bytes = encoding::encode_envelope(&self.envelope(payload)?)?;
        if bytes.len() > MAX_MESSAGE_SIZE_BYTES {
            return Err(UnisonError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE_BYTES });
        }
        trace!("publishing topic={} kind={} byte_len={}", topic, kind, bytes.len());
        self.bus.publish_topic(&topic, bytes).await.map_err(|err| UnisonError::TransportError {
            operation: format!("publish {kind}"),
            details: err.to_string(),
        })
    }

    async fn subscribe(&self, topic: String) -> Result<TransportSubscription, UnisonError> {
        debug!("subscribing topic={}", topic);
        let raw = self.bus.subscribe_topic(&topic).await?;
        Ok(filter_stream(self.verifier.clone(), self.seen.clone(), self.signer.sender_peer_id().clone(), raw.into_inner()))
    }
}

#[async_trait]
impl Transport for PubsubTransport {
    fn local_peer_id(&self) -> &PeerId {
        self.signer.sender_peer_id()
    }

    async fn publish_proposal(&self, proposal: Proposal) -> Result<(), UnisonError> {
        debug!(
            "publishing proposal round_id={} proposal_hash={} segments={}",
            proposal.round_id,
            proposal.proposal_hash,
            proposal.segments.len()
        );
        let topic = round_topic(&self.namespace, proposal.round_id);
        self.publish(topic, TransportMessage::Proposal(proposal)).await
    }

    async fn publish_report(&self, report: PlaybackReport) -> Result<(), UnisonError> {
        self.publish(divergence_topic(&self.namespace), TransportMessage::PlaybackReport(report)).await
    }

    async fn publish_announce(&self, announce: PeerAnnounce) -> Result<(), UnisonError> {
        self.publish(discovery_topic(&self.namespace), TransportMessage::Announce(announce)).await
    }

    async fn subscribe_round(&self, round_id: RoundId) -> Result<TransportSubscription, UnisonError> {
        self.subscribe(round_topic(&self.namespace, round_id)).await
    }

    async fn subscribe_reports(&self) -> Result<TransportSubscription, UnisonError> {
        self.subscribe(divergence_topic(&self.namespace)).await
    }

    async fn subscribe_discovery(&self) -> Result<TransportSubscription, UnisonError> {
        self.subscribe(discovery_topic(&self.namespace)).await
    }
}
