//! # Execution Error Types
//!
//! Centralized error definitions for the exec-core crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.
//!
//! Aggregate errors (pool exhaustion, exhausted retries) keep the last
//! underlying failure as their `source` and repeat its message, so the
//! original cause is always visible to the caller.

use alloy::primitives::{Address, B256};
use thiserror::Error;

/// Unified error type for the resilient execution layer.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("All {attempts} endpoints for '{target}' exhausted. Last error: {source}")]
    PoolExhausted {
        target: String,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} failed after {attempts} attempts. Last error: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} hit a terminal error on attempt {attempt}: {source}")]
    Terminal {
        operation: String,
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Nonce conflict: {message}")]
    NonceConflict { message: String },

    #[error(
        "Pending transactions for {address} did not confirm within {waited_ms}ms \
         (confirmed={confirmed}, pending={pending})"
    )]
    PendingTimeout {
        address: Address,
        waited_ms: u64,
        confirmed: u64,
        pending: u64,
    },

    #[error("Transaction {hash} reverted on-chain")]
    Reverted { hash: B256 },

    #[error("No receipt for {hash} after {waited_ms}ms")]
    ReceiptTimeout { hash: B256, waited_ms: u64 },

    #[error("No healthy proxy found after {attempts} attempts")]
    NoHealthyProxy { attempts: u32 },

    #[error("Transaction submission failed: {message}")]
    Send { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification of [`ExecError`], used by callers to decide
/// between success, skip and failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientInfra,
    NonceConflict,
    ExecutionReverted,
    PoolExhausted,
    ConfigMissing,
    Cancelled,
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Config(_) => ErrorKind::ConfigMissing,
            ExecError::NonceConflict { .. } => ErrorKind::NonceConflict,
            ExecError::Reverted { .. } => ErrorKind::ExecutionReverted,
            ExecError::PoolExhausted { .. }
            | ExecError::RetriesExhausted { .. }
            | ExecError::NoHealthyProxy { .. } => ErrorKind::PoolExhausted,
            ExecError::Cancelled => ErrorKind::Cancelled,
            ExecError::Network(_)
            | ExecError::Terminal { .. }
            | ExecError::PendingTimeout { .. }
            | ExecError::ReceiptTimeout { .. }
            | ExecError::Send { .. } => ErrorKind::TransientInfra,
        }
    }

    /// True when retrying the same call can never succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConfigMissing | ErrorKind::ExecutionReverted | ErrorKind::Cancelled
        )
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },

    #[error("Parse error in {path}: {msg}")]
    Parse { path: String, msg: String },

    #[error("Unknown network: '{name}'")]
    UnknownNetwork { name: String },

    #[error("Invalid private key: {reason}")]
    InvalidKey { reason: String },

    #[error("No proxy credentials loaded")]
    NoProxies,
}

/// Network and HTTP-related errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Cannot build client for proxy {proxy}: {reason}")]
    ProxyBuild { proxy: String, reason: String },
}
