//! Error types for the FarmTrace ledger

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A stored block no longer matches its own digest, or no longer links to
    /// its predecessor.
    #[error("Integrity violation at block {index}: {reason}")]
    IntegrityViolation { index: u64, reason: String },

    /// The durable store rejected a write. The in-memory chain is left as it
    /// was before the failed commit.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// A durable record exists but cannot be turned back into a chain.
    #[error("Stored ledger is corrupt: {0}")]
    LoadCorruption(String),

    /// An event payload was rejected before it reached the pending buffer.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LedgerError {
    pub fn integrity(index: u64, reason: impl Into<String>) -> Self {
        LedgerError::IntegrityViolation {
            index,
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
