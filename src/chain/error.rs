//! Error types for chain access and transaction fragments.

use thiserror::Error;

/// Errors specific to blockchain connectivity and queries.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Failed to connect to chain RPC at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Block height regression: current {current} < expected {expected}")]
    BlockRegression { current: u64, expected: u64 },

    #[error("RPC request failed: {0}")]
    RpcError(String),

    #[error("Failed to decode chain storage: {0}")]
    DecodeError(String),
}

/// Errors building or decoding a transaction fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("Invalid call target {0:?}: expected <package>::<module>::<function>")]
    InvalidTarget(String),

    #[error("Invalid identifier in call: {0}")]
    InvalidId(String),

    #[error("Unsupported fragment version {0}")]
    UnsupportedVersion(u8),

    #[error("Failed to decode fragment: {0}")]
    Decode(String),
}
