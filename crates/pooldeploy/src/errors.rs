use alloy::primitives::Address;
use thiserror::Error;

/// Domain failures that callers (and tests) match on.
///
/// Everything else travels as a plain `eyre::Report` with context attached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error(
        "chunk {index}/{total} failed; not submitted: {}",
        unapplied.join(", ")
    )]
    ChunkFailed {
        /// 1-based index of the chunk whose transaction failed.
        index: usize,
        total: usize,
        /// Symbols of the failed chunk and of every chunk after it.
        unapplied: Vec<String>,
    },

    #[error("another run holds the lock for network {network}")]
    RunLocked { network: String },

    #[error("address book has no entry for {key}")]
    MissingAddress { key: String },

    #[error("pool admin is {actual}, expected {expected}")]
    PoolAdminMismatch { expected: Address, actual: Address },

    #[error("failed to restore pool admin to {restore_to}; {holder} still holds the role")]
    AdminRestoreFailed { holder: Address, restore_to: Address },

    #[error("unknown market: {0}")]
    UnknownMarket(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
