//! FCM Miner
//!
//! A client-side proof-of-work miner for the FCM Soroban contract on Stellar:
//! - Reads the contract's chain state and latest block from Soroban RPC
//! - Searches nonces whose Keccak-256 preimage hash meets the difficulty
//! - Abandons attempts when the chain tip moves
//! - Assembles the priced `mine` transaction for external signing

pub mod address;
pub mod chain;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod miner;
pub mod preimage;
pub mod transaction;
pub mod types;
pub mod utils;
pub mod xdr;

pub use address::Address;
pub use chain::{ChainSnapshot, ChainStateReader, ChainWatcher, LedgerReader, PollSchedule};
pub use client::SorobanClient;
pub use config::Config;
pub use error::{Error, Result};
pub use miner::{Miner, MinerConfig, MinerState, MiningToggle, SearchOutcome, Solution, StalePolicy};
pub use preimage::{encode_preimage, Preimage};
pub use transaction::{LedgerWriter, SubmittablePayload, TransactionAssembler};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "fcm-miner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
