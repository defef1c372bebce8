//! Swap quote client
//!
//! Fetches router call data from an HTTP quote API. Responses differ between
//! providers, so they are decoded from loose JSON: the router may sit at the
//! top level or under `tx`, and amounts may be decimal strings, hex strings
//! or plain numbers.

use crate::config::QuoteConfig;
use crate::error::{ExecError, NetworkError};
use crate::traits::TxParams;
use crate::utils::{proxied_client, with_retry_using, ProxyCredential, ProxyPool, RetryPolicy};
use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const MAX_BPS: u16 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub token_in: Address,
    pub token_out: Address,
    pub amount: U256,
    pub slippage_bps: u16,
    pub trader: Address,
}

impl QuoteRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("chainId", self.chain_id.to_string()),
            ("tokenIn", self.token_in.to_string()),
            ("tokenOut", self.token_out.to_string()),
            ("amount", self.amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
            ("trader", self.trader.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub router: Address,
    pub call_data: Bytes,
    pub value: U256,
    pub expected_out: Vec<U256>,
    pub gas: Option<u64>,
}

impl SwapQuote {
    /// Decodes a quote response. `router` and call data are required,
    /// everything else is optional.
    pub fn from_value(body: &Value) -> Result<Self, String> {
        let router = lookup(body, &["router", "to", "routerAddress"])
            .and_then(Value::as_str)
            .ok_or("missing router address")?;
        let router = Address::from_str(router).map_err(|e| format!("bad router '{}': {}", router, e))?;

        let call_data = lookup(body, &["data", "callData", "calldata"])
            .and_then(Value::as_str)
            .ok_or("missing call data")?;
        let call_data =
            Bytes::from_str(call_data).map_err(|e| format!("bad call data: {}", e))?;

        let value = match lookup(body, &["value"]) {
            Some(v) => parse_amount(v).ok_or("bad value")?,
            None => U256::ZERO,
        };

        let expected_out = match lookup(body, &["amountsOut", "expectedOutputs", "amountOut"]) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| parse_amount(v).ok_or("bad expected output"))
                .collect::<Result<Vec<_>, _>>()?,
            Some(single) => vec![parse_amount(single).ok_or("bad expected output")?],
            None => Vec::new(),
        };

        let gas = lookup(body, &["gas", "gasLimit", "estimatedGas"])
            .and_then(parse_amount)
            .and_then(|g| u64::try_from(g).ok());

        Ok(Self {
            router,
            call_data,
            value,
            expected_out,
            gas,
        })
    }

    /// Final hop of the route, if the API reported one.
    pub fn expected_amount_out(&self) -> Option<U256> {
        self.expected_out.last().copied()
    }

    pub fn into_tx_params(self) -> TxParams {
        TxParams {
            to: self.router,
            data: self.call_data,
            value: self.value,
            gas_limit: self.gas,
        }
    }
}

/// `floor(expected * (10000 - bps) / 10000)`, with `bps` capped at 10000.
/// Split into quotient and remainder so large amounts cannot overflow.
pub fn min_amount_out(expected: U256, slippage_bps: u16) -> U256 {
    let denom = U256::from(MAX_BPS);
    let keep = U256::from(MAX_BPS - slippage_bps.min(MAX_BPS));
    let (q, r) = expected.div_rem(denom);
    q * keep + r * keep / denom
}

fn lookup<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let scopes = [Some(body), body.get("tx")];
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| keys.iter().find_map(|k| scope.get(*k)))
        .filter(|v| !v.is_null())
}

fn parse_amount(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => U256::from_str(s.trim()).ok(),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .or_else(|| U256::from_str(&n.to_string()).ok())
            .or_else(|| n.as_f64().and_then(integral_f64)),
        _ => None,
    }
}

/// Wei-sized JSON numbers arrive as `f64`; accept them when integral.
fn integral_f64(f: f64) -> Option<U256> {
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u128::MAX as f64 {
        Some(U256::from(f as u128))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct QuoteClient {
    base_url: String,
    timeout: Duration,
    direct: Client,
}

impl QuoteClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExecError> {
        let base_url = base_url.into();
        let direct = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::InvalidResponse {
                endpoint: base_url.clone(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url,
            timeout,
            direct,
        })
    }

    pub fn from_config(base_url: impl Into<String>, config: &QuoteConfig) -> Result<Self, ExecError> {
        Self::new(base_url, config.request_timeout())
    }

    /// One request, routed through `proxy` when given.
    pub async fn fetch(&self, request: &QuoteRequest, proxy: Option<&ProxyCredential>) -> Result<SwapQuote> {
        let client = match proxy {
            Some(p) => proxied_client(p, self.timeout)?,
            None => self.direct.clone(),
        };

        let resp = client
            .get(&self.base_url)
            .query(&request.query_params())
            .send()
            .await
            .with_context(|| format!("Quote request to {} failed", self.base_url))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::HttpError {
                status_code: status.as_u16(),
                endpoint: self.base_url.clone(),
            }
            .into());
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Quote response from {} is not JSON", self.base_url))?;

        SwapQuote::from_value(&body).map_err(|reason| {
            NetworkError::InvalidResponse {
                endpoint: self.base_url.clone(),
                reason,
            }
            .into()
        })
    }

    /// Fetches under `policy`, taking a fresh proxy from `proxies` for every
    /// attempt.
    pub async fn fetch_with_retry(
        &self,
        request: &QuoteRequest,
        policy: &RetryPolicy,
        proxies: Option<&ProxyPool>,
        cancel: &CancellationToken,
    ) -> Result<SwapQuote, ExecError> {
        with_retry_using(
            policy,
            "fetch_quote",
            cancel,
            move || async move {
                match proxies {
                    Some(pool) => pool.pick_fast_healthy().await,
                    None => None,
                }
            },
            |proxy, attempt| async move {
                if let Some(p) = &proxy {
                    debug!("Quote attempt {} via proxy {}", attempt.attempt_number, p);
                }
                self.fetch(request, proxy.as_ref()).await
            },
        )
        .await
    }
}
