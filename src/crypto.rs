//! Hash evaluation for mining
//!
//! Keccak-256 digests (original Keccak padding, as verified by the contract)
//! and the leading-zero difficulty check.

use crate::types::{BlockHash, HASH_HEX_LEN};
use crate::{Error, Result};
use sha3::{Digest, Keccak256};

/// Reusable Keccak-256 hasher for mining operations
pub struct KeccakHasher {
    hasher: Keccak256,
}

impl KeccakHasher {
    /// Create a new Keccak-256 hasher
    pub fn new() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }

    /// Hash data and return the result
    pub fn hash(&mut self, data: &[u8]) -> BlockHash {
        self.hasher.update(data);
        BlockHash(self.hasher.finalize_reset().into())
    }

    /// Hash a preimage and check it against a difficulty
    pub fn hash_and_check(&mut self, data: &[u8], difficulty: u32) -> (bool, BlockHash) {
        let hash = self.hash(data);
        (hash.meets_difficulty(difficulty), hash)
    }
}

impl Default for KeccakHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot Keccak-256 digest
pub fn digest(data: &[u8]) -> BlockHash {
    BlockHash(Keccak256::digest(data).into())
}

/// Whether the first `difficulty` characters of `hash_hex` are all `'0'`.
///
/// A difficulty longer than the string can never be met.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|c| c == b'0')
}

/// Reject difficulties no 32-byte hash can satisfy
pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > HASH_HEX_LEN {
        return Err(Error::Difficulty {
            difficulty,
            max: HASH_HEX_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keccak_known_vectors() {
        assert_eq!(
            digest(b"").to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            digest(b"abc").to_hex(),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_hasher_reuse_is_deterministic() {
        let mut hasher = KeccakHasher::new();
        let first = hasher.hash(b"test data");
        let other = hasher.hash(b"different data");
        let second = hasher.hash(b"test data");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first, digest(b"test data"));
    }

    #[test]
    fn test_meets_difficulty_edges() {
        assert!(meets_difficulty("ffff", 0));
        assert!(meets_difficulty("", 0));
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(!meets_difficulty("0000", 5));
    }

    #[test]
    fn test_check_difficulty() {
        assert!(check_difficulty(0).is_ok());
        assert!(check_difficulty(64).is_ok());
        assert!(matches!(
            check_difficulty(65),
            Err(Error::Difficulty { difficulty: 65, max: 64 })
        ));
    }

    #[test]
    fn test_hash_and_check() {
        let mut hasher = KeccakHasher::new();
        let (met, hash) = hasher.hash_and_check(b"abc", 0);
        assert!(met);
        assert_eq!(hash, digest(b"abc"));

        // 4e03... has no leading zero
        let (met, _) = hasher.hash_and_check(b"abc", 1);
        assert!(!met);
    }

    proptest! {
        #[test]
        fn prop_difficulty_is_monotonic(zeros in 0usize..=64, tail in "[1-9a-f][0-9a-f]{63}") {
            let hex: String = "0".repeat(zeros) + &tail[..64 - zeros];
            let k = zeros as u32;
            for d in 0..=k {
                prop_assert!(meets_difficulty(&hex, d));
            }
            for d in (k + 1)..=70 {
                prop_assert!(!meets_difficulty(&hex, d));
            }
        }

        #[test]
        fn prop_string_and_byte_checks_agree(bytes in any::<[u8; 32]>(), d in 0u32..=66) {
            let hash = BlockHash(bytes);
            prop_assert_eq!(hash.meets_difficulty(d), meets_difficulty(&hash.to_hex(), d));
        }
    }
}
