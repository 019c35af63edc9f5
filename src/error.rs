//! Error handling for the FCM miner
//!
//! Error types covering local input validation, ledger transport, remote
//! simulation rejections and the lifecycle of a mining attempt.

use thiserror::Error;

/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the FCM miner
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid mining input (message or miner identity)
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Malformed XDR data
    #[error("XDR error: {message}")]
    Xdr { message: String },

    /// Ledger could not be reached or answered with a transport-level failure
    #[error("Ledger unavailable: {message}")]
    LedgerUnavailable { message: String },

    /// Ledger answered with data that does not match the contract schema
    #[error("Unexpected ledger data: {message}")]
    LedgerSchema { message: String },

    /// Ledger rejected the mining call while simulating it
    #[error("Simulation rejected: {diagnostic}")]
    Simulation { diagnostic: String },

    /// Chain tip moved past the block an attempt was mining
    #[error("Stale attempt: mining block {target_index} but the chain is at block {observed_current}")]
    StaleAttempt {
        target_index: u64,
        observed_current: u64,
    },

    /// Chain published a difficulty no hash can satisfy
    #[error("Unattainable difficulty {difficulty}: a hash has only {max} hex digits")]
    Difficulty { difficulty: u32, max: u32 },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create an XDR error
    pub fn xdr(message: impl Into<String>) -> Self {
        Self::Xdr {
            message: message.into(),
        }
    }

    /// Create a ledger availability error
    pub fn ledger_unavailable(message: impl Into<String>) -> Self {
        Self::LedgerUnavailable {
            message: message.into(),
        }
    }

    /// Create a ledger schema error
    pub fn ledger_schema(message: impl Into<String>) -> Self {
        Self::LedgerSchema {
            message: message.into(),
        }
    }

    /// Create a simulation error carrying the remote diagnostic
    pub fn simulation(diagnostic: impl Into<String>) -> Self {
        Self::Simulation {
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a stale attempt error
    pub fn stale(target_index: u64, observed_current: u64) -> Self {
        Self::StaleAttempt {
            target_index,
            observed_current,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if the next poll may succeed where this one failed.
    ///
    /// Nothing is retried inside the miner; the flag only tells the caller
    /// whether waiting for the next chain-state tick makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LedgerUnavailable { .. } | Error::Io(_) | Error::StaleAttempt { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Encoding { .. } => "encoding",
            Error::Xdr { .. } => "xdr",
            Error::LedgerUnavailable { .. } => "ledger_unavailable",
            Error::LedgerSchema { .. } => "ledger_schema",
            Error::Simulation { .. } => "simulation",
            Error::StaleAttempt { .. } => "stale_attempt",
            Error::Difficulty { .. } => "difficulty",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::ledger_unavailable(format!("HTTP {}: {}", status, err)),
            None => Error::ledger_unavailable(err.to_string()),
        }
    }
}
