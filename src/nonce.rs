// src/nonce.rs
//! Helpers for the EntryPoint's two-dimensional nonce.
//!
//! Layout: the high 192 bits are the key, the low 64 bits the per-key sequence.

use ethers::types::U256;

/// Builds a nonce from a key and a sequence. Key bits above 192 are dropped.
pub fn compose(key: U256, sequence: u64) -> U256 {
    (key << 64) | U256::from(sequence)
}

pub fn key(nonce: U256) -> U256 {
    nonce >> 64
}

pub fn sequence(nonce: U256) -> u64 {
    nonce.low_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::OnchainIdentifier;

    #[test]
    fn identifier_key_round_trips() {
        let id = OnchainIdentifier::default();
        let nonce = compose(id.as_uint(), 3);

        assert_eq!(key(nonce), id.as_uint());
        assert_eq!(sequence(nonce), 3);
    }

    #[test]
    fn zero_key_is_plain_sequence() {
        assert_eq!(compose(U256::zero(), 42), U256::from(42));
        assert_eq!(key(U256::from(42)), U256::zero());
    }

    #[test]
    fn key_above_192_bits_is_truncated() {
        let nonce = compose(U256::MAX, 0);
        assert_eq!(key(nonce), U256::MAX >> 64);
        assert_eq!(sequence(nonce), 0);
    }
}
