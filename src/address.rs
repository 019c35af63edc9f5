//! Stellar strkey addresses
//!
//! Miner identities and the mining contract are written as strkeys: base32
//! over a version byte, a 32-byte payload and a CRC16-XModem checksum.

use crate::{Error, Result};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of an encoded account or contract strkey
pub const STRKEY_LEN: usize = 56;

/// Version byte of ed25519 account ids (`G...`)
const VERSION_ACCOUNT: u8 = 6 << 3;

/// Version byte of contract ids (`C...`)
const VERSION_CONTRACT: u8 = 2 << 3;

/// An account or contract address on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Ed25519 account (`G...`)
    Account([u8; 32]),
    /// Contract (`C...`)
    Contract([u8; 32]),
}

impl Address {
    /// Parse and validate a strkey
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != STRKEY_LEN {
            return Err(Error::encoding(format!(
                "Invalid address length: expected {} chars, got {}",
                STRKEY_LEN,
                s.len()
            )));
        }

        let raw = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| Error::encoding(format!("Invalid address encoding: {}", e)))?;

        // version (1) + payload (32) + checksum (2)
        if raw.len() != 35 {
            return Err(Error::encoding("Invalid address payload length"));
        }

        let (body, checksum) = raw.split_at(33);
        let expected = u16::from_le_bytes([checksum[0], checksum[1]]);
        if crc16_xmodem(body) != expected {
            return Err(Error::encoding(format!("Invalid address checksum: {}", s)));
        }

        let mut payload = [0u8; 32];
        payload.copy_from_slice(&body[1..]);

        match body[0] {
            VERSION_ACCOUNT => Ok(Address::Account(payload)),
            VERSION_CONTRACT => Ok(Address::Contract(payload)),
            other => Err(Error::encoding(format!(
                "Unsupported address version byte: {:#04x}",
                other
            ))),
        }
    }

    /// Raw 32-byte payload
    pub fn payload(&self) -> &[u8; 32] {
        match self {
            Address::Account(key) | Address::Contract(key) => key,
        }
    }

    /// Ed25519 key of an account address
    pub fn account_id(&self) -> Option<[u8; 32]> {
        match self {
            Address::Account(key) => Some(*key),
            Address::Contract(_) => None,
        }
    }

    /// Whether this is an account address
    pub fn is_account(&self) -> bool {
        matches!(self, Address::Account(_))
    }

    /// Encode as a strkey
    pub fn to_strkey(&self) -> String {
        let version = match self {
            Address::Account(_) => VERSION_ACCOUNT,
            Address::Contract(_) => VERSION_CONTRACT,
        };

        let mut raw = Vec::with_capacity(35);
        raw.push(version);
        raw.extend_from_slice(self.payload());
        let checksum = crc16_xmodem(&raw);
        raw.extend_from_slice(&checksum.to_le_bytes());

        BASE32_NOPAD.encode(&raw)
    }
}

/// CRC16-XModem (poly 0x1021, init 0)
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strkey())
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_strkey())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}
