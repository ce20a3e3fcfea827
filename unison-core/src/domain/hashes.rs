use crate::foundation::{CatalogHash, ContentId, Hash32, PeerId, ProposalHash, RoundId, TrackId};
use blake3::Hasher;

const CATALOG_HASH_DOMAIN_V1: &[u8] = b"unison:catalog:v1:";
const PROPOSAL_HASH_DOMAIN_V1: &[u8] = b"unison:proposal:v1:";

/// Hash over the track ids in catalog order, so reordering or changing the set changes the hash.
pub fn catalog_hash<'a>(track_ids: impl IntoIterator<Item = &'a TrackId>) -> CatalogHash {
    let mut hasher = Hasher::new();
    hasher.update(CATALOG_HASH_DOMAIN_V1);
    for track_id in track_ids {
        update_len_prefixed(&mut hasher, track_id.as_bytes());
    }
    CatalogHash::new(*hasher.finalize().as_bytes())
}

pub fn proposal_hash(round_id: RoundId, peer_id: &PeerId, content_ids: &[ContentId], timestamp_ns: u64) -> ProposalHash {
    let mut hasher = Hasher::new();
    hasher.update(PROPOSAL_HASH_DOMAIN_V1);
    hasher.update(&round_id.to_le_bytes());
    update_len_prefixed(&mut hasher, peer_id.as_bytes());
    hasher.update(&(content_ids.len() as u64).to_le_bytes());
    for content_id in content_ids {
        update_len_prefixed(&mut hasher, content_id.as_bytes());
    }
    hasher.update(&timestamp_ns.to_le_bytes());
    ProposalHash::new(*hasher.finalize().as_bytes())
}

/// `hash(round_id || concat(sorted proposal hashes))` over their textual forms.
///
/// The round id is rendered in decimal and each hash is appended as-is, so round 42 with
/// hashes `A1`, `B2`, `C3` hashes the bytes of `"42A1B2C3"`.
pub fn canonical_seed<S: AsRef<str>>(round_id: RoundId, sorted_hashes: &[S]) -> Hash32 {
    let mut hasher = Hasher::new();
    hasher.update(round_id.to_string().as_bytes());
    for hash in sorted_hashes {
        hasher.update(hash.as_ref().as_bytes());
    }
    *hasher.finalize().as_bytes()
}

/// Reduces the full 256-bit big-endian seed modulo `n`. Returns 0 when `n == 0`.
pub fn seed_index(seed: &Hash32, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let modulus = n as u128;
    let rem = seed.iter().fold(0u128, |acc, byte| ((acc << 8) | u128::from(*byte)) % modulus);
    rem as usize
}

fn update_len_prefixed(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u32).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_seed_hashes_decimal_round_and_concatenated_hashes() {
        let seed = canonical_seed(42, &["A1", "B2", "C3"]);
        assert_eq!(seed, *blake3::hash(b"42A1B2C3").as_bytes());
    }

    #[test]
    fn seed_index_matches_small_modulus_arithmetic() {
        let mut seed = [0u8; 32];
        seed[31] = 7;
        assert_eq!(seed_index(&seed, 3), 1);
        seed[30] = 1; // 263
        assert_eq!(seed_index(&seed, 5), 263 % 5);
        assert_eq!(seed_index(&[0xff; 32], 1), 0);
        assert_eq!(seed_index(&seed, 0), 0);
    }

    #[test]
    fn proposal_hash_commits_to_every_field() {
        let peer = PeerId::from("peer");
        let cids = vec![ContentId::from("c1"), ContentId::from("c2")];
        let base = proposal_hash(1, &peer, &cids, 10);
        assert_eq!(base, proposal_hash(1, &peer, &cids, 10));
        assert_ne!(base, proposal_hash(2, &peer, &cids, 10));
        assert_ne!(base, proposal_hash(1, &PeerId::from("other"), &cids, 10));
        assert_ne!(base, proposal_hash(1, &peer, &cids[..1], 10));
        assert_ne!(base, proposal_hash(1, &peer, &cids, 11));
    }
}
