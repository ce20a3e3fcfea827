use super::messages::{MessageEnvelope, TransportMessage};
use crate::foundation::{Hash32, PayloadHash, PeerId, UnisonError};
use bincode::Options;

const WIRE_PROTOCOL_VERSION_V1: u16 = 1;
const SIGNING_DOMAIN: &[u8] = b"unison/envelope/v1";

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>, UnisonError> {
    let mut out = Vec::new();
    out.extend_from_slice(&WIRE_PROTOCOL_VERSION_V1.to_le_bytes());
    let bytes = bincode_options().serialize(envelope).map_err(|err| crate::serde_err!("bincode", err))?;
    out.extend_from_slice(&bytes);
    Ok(out)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<MessageEnvelope, UnisonError> {
    if bytes.len() < 2 {
        return Err(UnisonError::TransportError { operation: "decode".to_string(), details: "message too short".to_string() });
    }
    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    if version != WIRE_PROTOCOL_VERSION_V1 {
        return Err(UnisonError::TransportError {
            operation: "decode".to_string(),
            details: format!("wire protocol version mismatch: expected {WIRE_PROTOCOL_VERSION_V1}, got {version}"),
        });
    }
    bincode_options().deserialize(&bytes[2..]).map_err(|err| crate::serde_err!("bincode", err))
}

pub fn payload_hash(payload: &TransportMessage) -> Result<PayloadHash, UnisonError> {
    let bytes = bincode_options().serialize(payload).map_err(|err| crate::serde_err!("bincode", err))?;
    Ok(PayloadHash::from(*blake3::hash(&bytes).as_bytes()))
}

/// Digest covered by the envelope signature. Binds sender and sequence so a signed payload
/// cannot be replayed under another identity or slot.
pub fn signing_digest(sender: &PeerId, seq_no: u64, timestamp_nanos: u64, payload_hash: &PayloadHash) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SIGNING_DOMAIN);
    hasher.update(&(sender.len() as u64).to_le_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(&seq_no.to_le_bytes());
    hasher.update(&timestamp_nanos.to_le_bytes());
    hasher.update(payload_hash.as_hash());
    *hasher.finalize().as_bytes()
}
