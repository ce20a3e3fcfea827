use super::encoding;
use super::traits::{MessageEnvelope, SignatureVerifier, TransportSubscription};
use crate::foundation::{now_nanos, PeerId, UnisonError};
use crate::foundation::{MAX_MESSAGE_SIZE_BYTES, SEEN_MESSAGE_CLEANUP_INTERVAL_MESSAGES, SEEN_MESSAGE_TTL_NANOS};
use futures_util::stream::BoxStream;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Replay suppression keyed by `(sender, seq_no)`, shared by every subscription of one transport.
#[derive(Default)]
pub struct SeenMessages {
    seen: Mutex<HashMap<(PeerId, u64), u64>>,
}

impl SeenMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a pair is seen.
    pub fn mark_seen(&self, sender: &PeerId, seq_no: u64, timestamp_nanos: u64) -> bool {
        let Ok(mut seen) = self.seen.lock() else { return true };
        seen.insert((sender.clone(), seq_no), timestamp_nanos).is_none()
    }

    pub fn cleanup(&self, cutoff_nanos: u64) -> usize {
        let Ok(mut seen) = self.seen.lock() else { return 0 };
        let before = seen.len();
        seen.retain(|_, ts| *ts >= cutoff_nanos);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn rejected(operation: &str, details: String) -> UnisonError {
    UnisonError::TransportError { operation: operation.to_string(), details }
}

/// Turns raw topic bytes into verified envelopes. Own messages and replays are dropped
/// silently; malformed or forged ones surface as errors the consumer logs and skips.
pub fn filter_stream(
    verifier: Arc<dyn SignatureVerifier>,
    seen: Arc<SeenMessages>,
    local_peer_id: PeerId,
    mut stream: BoxStream<'static, Result<Vec<u8>, UnisonError>>,
) -> TransportSubscription {
    let cleanup_counter = std::sync::atomic::AtomicU64::new(0);
    let mapped = async_stream::stream! {
        while let Some(item) = futures_util::StreamExt::next(&mut stream).await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(err) => {
                    yield Err(err);
                    continue;
                }
            };
            if bytes.len() > MAX_MESSAGE_SIZE_BYTES {
                yield Err(UnisonError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE_BYTES });
                continue;
            }
            let envelope = match encoding::decode_envelope(&bytes) {
                Ok(envelope) => envelope,
                Err(err) => {
                    yield Err(err);
                    continue;
                }
            };
            if envelope.sender_peer_id == local_peer_id {
                trace!("own message dropped seq_no={}", envelope.seq_no);
                continue;
            }
            if envelope.payload.origin_peer_id() != &envelope.sender_peer_id {
                warn!(
                    "payload origin mismatch sender={} origin={} kind={}",
                    envelope.sender_peer_id,
                    envelope.payload.origin_peer_id(),
                    envelope.payload.kind()
                );
                yield Err(rejected("origin_mismatch", format!("sender={} origin={}", envelope.sender_peer_id, envelope.payload.origin_peer_id())));
                continue;
            }

            let expected = match encoding::payload_hash(&envelope.payload) {
                Ok(expected) => expected,
                Err(err) => {
                    yield Err(err);
                    continue;
                }
            };
            if !expected.ct_eq(&envelope.payload_hash) {
                warn!(
                    "payload hash mismatch peer_id={} expected_hash={} actual_hash={}",
                    envelope.sender_peer_id, expected, envelope.payload_hash
                );
                yield Err(rejected("payload_hash_mismatch", format!("peer_id={}", envelope.sender_peer_id)));
                continue;
            }
            let digest = encoding::signing_digest(&envelope.sender_peer_id, envelope.seq_no, envelope.timestamp_nanos, &envelope.payload_hash);
            if !verifier.verify(&envelope.sender_peer_id, &envelope.sender_pubkey, &digest, &envelope.signature) {
                warn!("invalid signature peer_id={} payload_hash={}", envelope.sender_peer_id, envelope.payload_hash);
                yield Err(rejected("signature_verification", format!("peer_id={}", envelope.sender_peer_id)));
                continue;
            }

            if !seen.mark_seen(&envelope.sender_peer_id, envelope.seq_no, envelope.timestamp_nanos) {
                debug!("duplicate message ignored peer_id={} seq_no={}", envelope.sender_peer_id, envelope.seq_no);
                continue;
            }
            if cleanup_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % SEEN_MESSAGE_CLEANUP_INTERVAL_MESSAGES == 0 {
                let cutoff = now_nanos().saturating_sub(SEEN_MESSAGE_TTL_NANOS);
                let deleted = seen.cleanup(cutoff);
                trace!("cleanup_seen_messages cutoff={} deleted={}", cutoff, deleted);
            }
            debug!(
                "accepted message peer_id={} seq_no={} kind={}",
                envelope.sender_peer_id,
                envelope.seq_no,
                envelope.payload.kind()
            );
            yield Ok(envelope);
        }
    };
    TransportSubscription::new(Box::pin(mapped))
}
