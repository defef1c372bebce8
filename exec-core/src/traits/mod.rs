use crate::utils::ProxyCredential;
use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Block tag for transaction-count queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// Mined transactions only (confirmed count)
    Latest,
    /// Including transactions still in the mempool (pending count)
    Pending,
}

/// Parameters of a state-changing call, as produced by a protocol module
/// or a swap quote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxParams {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

/// Error raised by [`ChainWriter::send_transaction`].
///
/// `payload` holds whatever structured data the provider returned,
/// decoded into JSON without assuming a fixed shape.
#[derive(Debug, Clone)]
pub struct SendError {
    pub message: String,
    pub payload: Option<Value>,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SendError {}

/// Read-only chain access bound to a single endpoint.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// URL of the endpoint this reader talks to
    fn endpoint(&self) -> &str;

    async fn transaction_count(&self, address: Address, tag: BlockTag) -> Result<u64>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn estimate_gas(&self, from: Address, tx: &TxParams) -> Result<u64>;

    /// `None` while the transaction is not mined, otherwise the execution status
    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>>;
}

/// Signing chain access bound to a single endpoint.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    fn sender(&self) -> Address;

    /// Sends `tx` with an explicit nonce and returns the transaction hash.
    async fn send_transaction(&self, tx: &TxParams, nonce: u64) -> Result<B256, SendError>;
}

/// Connectivity check for a single proxy credential.
#[async_trait]
pub trait ProxyProber: Send + Sync {
    async fn probe(&self, proxy: &ProxyCredential) -> bool;
}
