use super::traits::{SignatureSigner, SignatureVerifier};
use crate::foundation::util::encoding::parse_hex_32bytes;
use crate::foundation::{Hash32, PeerId, UnisonError};
use crate::infrastructure::storage::write_atomic;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use log::info;
use rand::RngCore;
use std::path::Path;

pub const IDENTITY_FILE_NAME: &str = "identity.key";

/// Node identity. The peer id is the hex of the ed25519 verifying key, so any receiver can
/// check that an envelope's public key belongs to its claimed sender.
#[derive(Clone)]
pub struct Ed25519Signer {
    peer_id: PeerId,
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let peer_id = PeerId::new(hex::encode(key.verifying_key().to_bytes()));
        Self { peer_id, key }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl SignatureSigner for Ed25519Signer {
    fn sender_peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, digest: &Hash32) -> Vec<u8> {
        self.key.sign(digest).to_bytes().to_vec()
    }
}

/// Self-certifying verifier: trusts any key whose hex equals the sender's peer id.
#[derive(Clone, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, sender_peer_id: &PeerId, public_key: &[u8], digest: &Hash32, signature: &[u8]) -> bool {
        if hex::encode(public_key) != sender_peer_id.as_str() {
            return false;
        }
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else { return false };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else { return false };
        let Ok(signature) = Signature::from_slice(signature) else { return false };
        key.verify_strict(digest, &signature).is_ok()
    }
}

/// Uses the configured seed, otherwise the seed stored in `data_dir`, otherwise a fresh one
/// which is then stored.
pub fn load_or_create_seed(configured_hex: Option<&str>, data_dir: &Path) -> Result<[u8; 32], UnisonError> {
    if let Some(seed) = configured_hex.filter(|s| !s.trim().is_empty()) {
        return parse_hex_32bytes(seed);
    }
    let path = data_dir.join(IDENTITY_FILE_NAME);
    if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|err| crate::storage_err!("read identity", err))?;
        return parse_hex_32bytes(&contents);
    }
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    std::fs::create_dir_all(data_dir).map_err(|err| crate::storage_err!("create data dir", err))?;
    write_atomic(data_dir, &path, hex::encode(seed).as_bytes())?;
    info!("identity: generated new node key path={}", path.display());
    Ok(seed)
}
