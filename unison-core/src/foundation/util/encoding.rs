use crate::foundation::{Hash32, UnisonError};

pub fn decode_hex(s: &str) -> Result<Vec<u8>, UnisonError> {
    hex::decode(s).map_err(|err| UnisonError::EncodingError(err.to_string()))
}

/// Parses a 32-byte value from hex, accepting an optional `0x` prefix.
pub fn parse_hex_32bytes(s: &str) -> Result<Hash32, UnisonError> {
    let trimmed = s.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = decode_hex(stripped)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| UnisonError::EncodingError(format!("expected 32 bytes, got {len}")))
}
