//! Core types for FCM mining
//!
//! Values read from the contract (chain state and blocks) and the local
//! inputs of a mining attempt, with validation and JSON serialization.

use crate::address::Address;
use crate::xdr::{ScFields, ScVal};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum message length in characters
pub const MAX_MESSAGE_LEN: usize = 64;

/// Number of hex digits in a block hash
pub const HASH_HEX_LEN: u32 = 64;

/// Proof-of-work nonce (8 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Create a new nonce
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Convert to bytes (big-endian, as laid out in the preimage)
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Create from bytes (big-endian)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            Error::encoding(format!(
                "Invalid nonce length: expected 8 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(array)))
    }

    /// Next nonce, or `None` once the space is exhausted
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte Keccak-256 block hash
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Create from a byte slice of exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::encoding(format!(
                "Invalid hash length: expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Number of leading `'0'` hex digits
    pub fn leading_zero_digits(&self) -> u32 {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 2;
                continue;
            }
            if byte >> 4 == 0 {
                zeros += 1;
            }
            break;
        }
        zeros
    }

    /// Whether the hash starts with at least `difficulty` zero hex digits
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_digits() >= difficulty
    }
}

impl FromStr for BlockHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| Error::encoding(format!("Invalid hash hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Operator message recorded in the mined block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinerMessage(String);

impl MinerMessage {
    /// Validate a message: non-empty and at most [`MAX_MESSAGE_LEN`] UTF-16
    /// code units, the limit the web miner's input field enforces. Characters
    /// outside the Basic Multilingual Plane count twice.
    pub fn new(message: impl Into<String>) -> Result<Self> {
        let message = message.into();
        if message.is_empty() {
            return Err(Error::encoding("Message must not be empty"));
        }
        let len = message.encode_utf16().count();
        if len > MAX_MESSAGE_LEN {
            return Err(Error::encoding(format!(
                "Message too long: {} UTF-16 units, at most {} allowed",
                len, MAX_MESSAGE_LEN
            )));
        }
        Ok(Self(message))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MinerMessage {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        MinerMessage::new(value)
    }
}

impl From<MinerMessage> for String {
    fn from(message: MinerMessage) -> Self {
        message.0
    }
}

impl FromStr for MinerMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MinerMessage::new(s)
    }
}

impl fmt::Display for MinerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Global mining parameters stored in the contract instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Token contract rewarded to finders
    pub fcm: Address,
    /// Index of the last mined block
    pub current: u64,
    /// Required leading zero hex digits
    pub difficulty: u32,
    pub is_nuked: bool,
    /// Miner of the last block
    pub finder: Address,
}

impl ChainState {
    /// Decode the contract's `State` struct
    pub fn from_sc_val(value: &ScVal) -> Result<Self> {
        let fields = ScFields::new("State", value)?;
        Ok(Self {
            fcm: fields.address("fcm")?,
            current: fields.u64("current")?,
            difficulty: fields.u32("difficulty")?,
            is_nuked: fields.bool("is_nuked")?,
            finder: fields.address("finder")?,
        })
    }

    /// Encode as the contract's `State` struct
    pub fn to_sc_val(&self) -> ScVal {
        ScVal::Map(Some(vec![
            (ScVal::symbol("current"), ScVal::U64(self.current)),
            (ScVal::symbol("difficulty"), ScVal::U32(self.difficulty)),
            (ScVal::symbol("fcm"), ScVal::Address(self.fcm)),
            (ScVal::symbol("finder"), ScVal::Address(self.finder)),
            (ScVal::symbol("is_nuked"), ScVal::Bool(self.is_nuked)),
        ]))
    }
}

/// A mined block as stored by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub message: String,
    /// Raw hash of the previous block
    #[serde(with = "hex_bytes")]
    pub prev_hash: Vec<u8>,
    pub nonce: u64,
    pub miner: Address,
    pub hash: BlockHash,
    /// Ledger close time in seconds since the epoch
    pub timestamp: u64,
}

impl Block {
    /// Decode the contract's `Block` struct
    pub fn from_sc_val(value: &ScVal) -> Result<Self> {
        let fields = ScFields::new("Block", value)?;
        let hash = BlockHash::from_slice(fields.bytes("hash")?)
            .map_err(|e| Error::ledger_schema(format!("Block: {}", e)))?;

        Ok(Self {
            index: fields.u64("index")?,
            message: fields.string("message")?,
            prev_hash: fields.bytes("prev_hash")?.to_vec(),
            nonce: fields.u64("nonce")?,
            miner: fields.address("miner")?,
            hash,
            timestamp: fields.u64("timestamp")?,
        })
    }

    /// Encode as the contract's `Block` struct
    pub fn to_sc_val(&self) -> ScVal {
        ScVal::Map(Some(vec![
            (ScVal::symbol("hash"), ScVal::Bytes(self.hash.0.to_vec())),
            (ScVal::symbol("index"), ScVal::U64(self.index)),
            (ScVal::symbol("message"), ScVal::String(self.message.clone())),
            (ScVal::symbol("miner"), ScVal::Address(self.miner)),
            (ScVal::symbol("nonce"), ScVal::U64(self.nonce)),
            (ScVal::symbol("prev_hash"), ScVal::Bytes(self.prev_hash.clone())),
            (ScVal::symbol("timestamp"), ScVal::U64(self.timestamp)),
        ]))
    }

    /// Block time as a UTC datetime
    pub fn mined_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            index: 4,
            message: "gm".into(),
            prev_hash: vec![0xAA; 32],
            nonce: 1234,
            miner: Address::Account([2; 32]),
            hash: BlockHash([0x0F; 32]),
            timestamp: 1_717_000_000,
        }
    }

    #[test]
    fn test_nonce_operations() {
        let nonce = Nonce::new(100);
        assert_eq!(nonce.value(), 100);
        assert_eq!(nonce.next(), Some(Nonce::new(101)));
        assert_eq!(Nonce::new(u64::MAX).next(), None);
        assert_eq!(Nonce::from_bytes(&nonce.to_bytes()).unwrap(), nonce);
        assert!(Nonce::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_leading_zero_digits() {
        let mut bytes = [0xFFu8; 32];
        assert_eq!(BlockHash(bytes).leading_zero_digits(), 0);

        bytes[0] = 0x0F;
        assert_eq!(BlockHash(bytes).leading_zero_digits(), 1);

        bytes[0] = 0x00;
        bytes[1] = 0x5A;
        assert_eq!(BlockHash(bytes).leading_zero_digits(), 2);

        assert_eq!(BlockHash([0; 32]).leading_zero_digits(), HASH_HEX_LEN);
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hex = "005a6ceb19f9ea4e94bd81340d157b0e7e7a014ceaafd85e18ca22117acd97b2";
        let hash = BlockHash::from_str(hex).unwrap();
        assert_eq!(hash.to_string(), hex);
        assert!(hash.meets_difficulty(2));
        assert!(!hash.meets_difficulty(3));
        assert!(BlockHash::from_str("00ff").is_err());
    }

    #[test]
    fn test_message_validation() {
        assert!(MinerMessage::new("hello").is_ok());
        assert!(MinerMessage::new("").is_err());
        assert!(MinerMessage::new("x".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(MinerMessage::new("x".repeat(MAX_MESSAGE_LEN + 1)).is_err());
        // length is counted in UTF-16 units, not bytes
        assert!(MinerMessage::new("é".repeat(MAX_MESSAGE_LEN)).is_ok());
    }

    #[test]
    fn test_message_length_counts_utf16_units() {
        // each emoji is a surrogate pair
        let half = MAX_MESSAGE_LEN / 2;
        assert!(MinerMessage::new("😀".repeat(half)).is_ok());
        let err = MinerMessage::new("😀".repeat(half + 1)).unwrap_err();
        assert!(err.to_string().contains("66 UTF-16 units"));

        let mixed = format!("{}😀", "x".repeat(MAX_MESSAGE_LEN - 2));
        assert!(MinerMessage::new(mixed).is_ok());
        let mixed = format!("{}😀", "x".repeat(MAX_MESSAGE_LEN - 1));
        assert!(MinerMessage::new(mixed).is_err());
    }

    #[test]
    fn test_block_mined_at() {
        let mut block = Block {
            index: 4,
            message: "gm".to_string(),
            prev_hash: vec![0; 32],
            nonce: 0,
            miner: Address::Account([0; 32]),
            hash: BlockHash::default(),
            timestamp: 1_700_000_000,
        };
        assert_eq!(
            block.mined_at().map(|t| t.to_rfc3339()),
            Some("2023-11-14T22:13:20+00:00".to_string())
        );

        block.timestamp = u64::MAX;
        assert!(block.mined_at().is_none());
    }

    #[test]
    fn test_message_deserialization_validates() {
        assert!(serde_json::from_str::<MinerMessage>("\"\"").is_err());
        let message: MinerMessage = serde_json::from_str("\"gm\"").unwrap();
        assert_eq!(message.as_str(), "gm");
    }

    #[test]
    fn test_chain_state_from_sc_val() {
        let state = ChainState {
            fcm: Address::Contract([1; 32]),
            current: 41,
            difficulty: 7,
            is_nuked: false,
            finder: Address::Account([2; 32]),
        };
        assert_eq!(ChainState::from_sc_val(&state.to_sc_val()).unwrap(), state);
    }

    #[test]
    fn test_chain_state_schema_mismatch() {
        let value = ScVal::Map(Some(vec![(ScVal::symbol("current"), ScVal::U32(41))]));
        let err = ChainState::from_sc_val(&value).unwrap_err();
        assert!(matches!(err, Error::LedgerSchema { .. }));
    }

    #[test]
    fn test_block_from_sc_val() {
        let block = sample_block();
        let decoded = Block::from_sc_val(&block.to_sc_val()).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.mined_at().is_some());
    }

    #[test]
    fn test_block_with_short_hash_is_rejected() {
        let mut value = sample_block().to_sc_val();
        if let ScVal::Map(Some(entries)) = &mut value {
            entries[0].1 = ScVal::Bytes(vec![0; 31]);
        }
        assert!(matches!(
            Block::from_sc_val(&value),
            Err(Error::LedgerSchema { .. })
        ));
    }

    #[test]
    fn test_block_json_serialization() {
        let json = serde_json::to_value(sample_block()).unwrap();
        assert_eq!(json["prev_hash"], "aa".repeat(32));
        assert_eq!(json["hash"], "0f".repeat(32));
    }
}
