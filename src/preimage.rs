//! Mining preimage encoding
//!
//! The preimage is the concatenated XDR encoding of the five mining inputs,
//! in the order the contract hashes them: block index (u64), message
//! (string), previous hash (bytes), nonce (u64) and miner (address).

use crate::address::Address;
use crate::types::{MinerMessage, Nonce};
use crate::xdr::{ScVal, WriteXdr, XdrWriter};
use crate::Result;

/// Preimage with a rewritable nonce slot
///
/// Only the eight nonce bytes change between trials, so the buffer is built
/// once per attempt and the nonce is patched in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preimage {
    bytes: Vec<u8>,
    nonce_offset: usize,
}

impl Preimage {
    /// Encode the preimage for the given inputs
    pub fn new(
        target_index: u64,
        message: &MinerMessage,
        prev_hash: &[u8],
        nonce: Nonce,
        miner: &Address,
    ) -> Self {
        let mut w = XdrWriter::new();
        ScVal::U64(target_index).write_xdr(&mut w);
        ScVal::String(message.as_str().to_owned()).write_xdr(&mut w);
        ScVal::Bytes(prev_hash.to_vec()).write_xdr(&mut w);

        // nonce value follows its 4-byte discriminant
        let nonce_offset = w.len() + 4;
        ScVal::U64(nonce.value()).write_xdr(&mut w);
        ScVal::Address(*miner).write_xdr(&mut w);

        Self {
            bytes: w.into_bytes(),
            nonce_offset,
        }
    }

    /// Rewrite the nonce in place
    pub fn set_nonce(&mut self, nonce: Nonce) {
        self.bytes[self.nonce_offset..self.nonce_offset + 8].copy_from_slice(&nonce.to_bytes());
    }

    /// Nonce currently encoded in the preimage
    pub fn nonce(&self) -> Result<Nonce> {
        Nonce::from_bytes(&self.bytes[self.nonce_offset..self.nonce_offset + 8])
    }

    /// Encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encode a preimage from unvalidated inputs.
///
/// Fails with an encoding error when the message is empty or too long, or
/// when the miner identity is not a valid strkey.
pub fn encode_preimage(
    target_index: u64,
    message: &str,
    prev_hash: &[u8],
    nonce: u64,
    miner: &str,
) -> Result<Vec<u8>> {
    let message = MinerMessage::new(message)?;
    let miner = Address::parse(miner)?;
    let preimage = Preimage::new(target_index, &message, prev_hash, Nonce::new(nonce), &miner);
    Ok(preimage.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use proptest::prelude::*;

    const TEST_MINER: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";

    const GOLDEN_PREIMAGE: &str = concat!(
        "000000050000000000000005",
        "0000000e0000000568656c6c6f000000",
        "0000000d000000200000000000000000000000000000000000000000000000000000000000000000",
        "000000050000000000000000",
        "000000120000000000000000000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
    );

    #[test]
    fn test_golden_preimage() {
        let bytes = encode_preimage(5, "hello", &[0u8; 32], 0, TEST_MINER).unwrap();
        assert_eq!(bytes.len(), 124);
        assert_eq!(hex::encode(&bytes), GOLDEN_PREIMAGE);
    }

    #[test]
    fn test_set_nonce_matches_fresh_encoding() {
        let message = MinerMessage::new("hello").unwrap();
        let miner = Address::parse(TEST_MINER).unwrap();
        let mut preimage = Preimage::new(5, &message, &[0u8; 32], Nonce::new(0), &miner);

        preimage.set_nonce(Nonce::new(0x0102_0304_0506_0708));
        let fresh = Preimage::new(5, &message, &[0u8; 32], Nonce::new(0x0102_0304_0506_0708), &miner);

        assert_eq!(preimage, fresh);
        assert_eq!(preimage.nonce().unwrap().value(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_nonce_offset_follows_variable_fields() {
        let miner = Address::parse(TEST_MINER).unwrap();
        let long = MinerMessage::new("a longer message").unwrap();
        let mut preimage = Preimage::new(1, &long, &[7u8; 3], Nonce::new(0), &miner);
        preimage.set_nonce(Nonce::new(42));
        assert_eq!(preimage.nonce().unwrap(), Nonce::new(42));
        assert_eq!(
            preimage,
            Preimage::new(1, &long, &[7u8; 3], Nonce::new(42), &miner)
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            encode_preimage(5, "", &[0u8; 32], 0, TEST_MINER),
            Err(Error::Encoding { .. })
        ));
        assert!(matches!(
            encode_preimage(5, &"m".repeat(65), &[0u8; 32], 0, TEST_MINER),
            Err(Error::Encoding { .. })
        ));
        assert!(matches!(
            encode_preimage(5, "hello", &[0u8; 32], 0, "GNOTANADDRESS"),
            Err(Error::Encoding { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_encoding_is_deterministic(
            index in any::<u64>(),
            message in "[a-zA-Z0-9 ]{1,64}",
            prev_hash in proptest::collection::vec(any::<u8>(), 0..40),
            nonce in any::<u64>(),
        ) {
            let first = encode_preimage(index, &message, &prev_hash, nonce, TEST_MINER).unwrap();
            let second = encode_preimage(index, &message, &prev_hash, nonce, TEST_MINER).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_distinct_nonces_give_distinct_preimages(a in any::<u64>(), b in any::<u64>()) {
            prop_assume!(a != b);
            let first = encode_preimage(5, "hello", &[0u8; 32], a, TEST_MINER).unwrap();
            let second = encode_preimage(5, "hello", &[0u8; 32], b, TEST_MINER).unwrap();
            prop_assert_ne!(first, second);
        }
    }
}
