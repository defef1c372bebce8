//! Chain clients - Alloy-based JSON-RPC access bound to one endpoint
//!
//! [`RpcReader`] serves read-only calls (transaction counts, balances, gas
//! estimates, receipts). [`RpcWriter`] adds a local signer and submits
//! transactions with an explicit nonce. Both are built for exactly one
//! endpoint URL; switching endpoints means building a new client from the
//! [`EndpointPool`](crate::EndpointPool) cursor.

use crate::error::{ConfigError, ExecError, NetworkError};
use crate::traits::{BlockTag, ChainReader, ChainWriter, SendError, TxParams};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::client::ClientBuilder;
use alloy::rpc::types::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::Http;
use alloy::transports::{RpcError, TransportErrorKind};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn http_transport(rpc_url: &str) -> Result<Http<Client>, ExecError> {
    let url: Url = rpc_url.parse().map_err(|e: url::ParseError| ConfigError::InvalidValue {
        field: "rpc_url".to_string(),
        reason: format!("'{}': {}", rpc_url, e),
    })?;

    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(5)
        .build()
        .map_err(|e| NetworkError::InvalidResponse {
            endpoint: rpc_url.to_string(),
            reason: format!("cannot build HTTP client: {}", e),
        })?;

    Ok(Http::with_client(client, url))
}

fn tx_request(from: Address, tx: &TxParams) -> TransactionRequest {
    let request = TransactionRequest::default()
        .from(from)
        .to(tx.to)
        .input(tx.data.clone().into())
        .value(tx.value);

    match tx.gas_limit {
        Some(gas) => request.gas_limit(gas),
        None => request,
    }
}

/// Flattens an RPC error into a [`SendError`], keeping the JSON-RPC error
/// object (`code`, `message`, `data`) as payload when the node sent one.
pub fn send_error_from_rpc(error: &RpcError<TransportErrorKind>) -> SendError {
    let message = error.to_string();
    match error {
        RpcError::ErrorResp(payload) => {
            let data = payload
                .data
                .as_ref()
                .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok());
            SendError::new(message).with_payload(json!({
                "code": payload.code,
                "message": payload.message,
                "data": data,
            }))
        }
        _ => SendError::new(message),
    }
}

/// Read-only client for one endpoint
#[derive(Clone)]
pub struct RpcReader {
    url: String,
    provider: Arc<dyn Provider + Send + Sync>,
}

impl RpcReader {
    pub fn connect(rpc_url: &str) -> Result<Self, ExecError> {
        let client = ClientBuilder::default().transport(http_transport(rpc_url)?, false);
        let provider: Arc<dyn Provider + Send + Sync> =
            Arc::new(ProviderBuilder::new().connect_client(client));

        Ok(Self {
            url: rpc_url.to_string(),
            provider,
        })
    }

    pub fn provider(&self) -> &(dyn Provider + Send + Sync) {
        &*self.provider
    }
}

impl std::fmt::Debug for RpcReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcReader")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainReader for RpcReader {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn transaction_count(&self, address: Address, tag: BlockTag) -> Result<u64> {
        let block = match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Pending => BlockNumberOrTag::Pending,
        };

        self.provider
            .get_transaction_count(address)
            .block_id(BlockId::Number(block))
            .await
            .map_err(|e| anyhow!("Failed to get {:?} transaction count from {}: {}", tag, self.url, e))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| anyhow!("Failed to get balance from {}: {}", self.url, e))
    }

    async fn estimate_gas(&self, from: Address, tx: &TxParams) -> Result<u64> {
        self.provider
            .estimate_gas(tx_request(from, tx))
            .await
            .map_err(|e| anyhow!("Gas estimation failed on {}: {}", self.url, e))
    }

    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| anyhow!("Failed to get receipt {} from {}: {}", hash, self.url, e))?;

        Ok(receipt.map(|r| r.status()))
    }
}

/// Signing client for one endpoint
#[derive(Clone)]
pub struct RpcWriter {
    url: String,
    sender: Address,
    provider: Arc<dyn Provider + Send + Sync>,
}

impl RpcWriter {
    pub fn connect(rpc_url: &str, signer: PrivateKeySigner) -> Result<Self, ExecError> {
        let sender = signer.address();
        let client = ClientBuilder::default().transport(http_transport(rpc_url)?, false);
        let provider: Arc<dyn Provider + Send + Sync> =
            Arc::new(ProviderBuilder::new().wallet(signer).connect_client(client));

        Ok(Self {
            url: rpc_url.to_string(),
            sender,
            provider,
        })
    }

    /// Parses a hex private key before touching the network.
    pub fn from_private_key(rpc_url: &str, private_key: &str) -> Result<Self, ExecError> {
        let signer = parse_signer(private_key)?;
        Self::connect(rpc_url, signer)
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }
}

pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, ConfigError> {
    let trimmed = private_key.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidKey {
            reason: "empty key".to_string(),
        });
    }
    trimmed.parse().map_err(|e| ConfigError::InvalidKey {
        reason: format!("{}", e),
    })
}

impl std::fmt::Debug for RpcWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcWriter")
            .field("url", &self.url)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainWriter for RpcWriter {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn send_transaction(&self, tx: &TxParams, nonce: u64) -> Result<B256, SendError> {
        let request = tx_request(self.sender, tx).nonce(nonce);
        match self.provider.send_transaction(request).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => Err(send_error_from_rpc(&e)),
        }
    }
}
