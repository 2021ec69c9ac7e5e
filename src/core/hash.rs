//! State Hashing for Desync Detection
//!
//! Participants that applied the same frame packets hold byte-identical
//! snapshots, so a digest of the packed world is enough to compare them
//! without shipping the whole state.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for world snapshots.
pub const WORLD_STATE_DOMAIN: &[u8] = b"COINFIGHT_WORLD_V1";

/// Domain separator for frame packets.
pub const FRAME_PACKET_DOMAIN: &[u8] = b"COINFIGHT_FRAME_V1";

/// Deterministic SHA-256 hasher with a domain separator.
///
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u64 value (big-endian, like the wire).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_be_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = StateHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

/// Hash a packed world snapshot taken at `frame`.
pub fn compute_state_hash(frame: u64, snapshot: &[u8]) -> StateHash {
    let mut hasher = StateHasher::new(WORLD_STATE_DOMAIN);
    hasher.update_u64(frame);
    hasher.update_bytes(snapshot);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hash_determinism() {
        let data = [1u8, 2, 3, 4, 5];
        assert_eq!(compute_state_hash(10, &data), compute_state_hash(10, &data));
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u64(1);
            h.update_u64(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u64(2);
            h.update_u64(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];
        assert_ne!(
            hash_with_domain(WORLD_STATE_DOMAIN, &data),
            hash_with_domain(FRAME_PACKET_DOMAIN, &data)
        );
    }

    #[test]
    fn test_frame_number_is_hashed() {
        let data = [7u8; 16];
        assert_ne!(compute_state_hash(1, &data), compute_state_hash(2, &data));
    }
}
