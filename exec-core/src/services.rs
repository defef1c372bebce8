//! Execution Services - the shared infrastructure handed to protocol modules
//!
//! [`ExecServices`] owns every process-scoped piece of state: one
//! [`EndpointPool`] per configured network, the [`ProxyPool`], the
//! [`NonceSafeSubmitter`] and the [`CancellationToken`] honored by every
//! wait. It is constructed once and passed by reference (or `Arc`) to the
//! modules that need it; there is no global instance.
//!
//! # Startup
//!
//! Construction fails fast on configuration problems, before any network
//! traffic:
//! - invalid policy values or networks without endpoints
//! - `require_proxies = true` with an empty or missing proxy file
//!
//! With `warmup_on_start = true` a background probe of the whole proxy pool
//! is started so that [`ExecServices::next_proxy`] in fast mode sees real
//! health data instead of optimistic guesses.
//!
//! # Example
//!
//! ```rust,no_run
//! use exec_core::{ExecConfig, ExecServices};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let services = ExecServices::from_config(ExecConfig::load("config/exec.toml")?).await?;
//!
//! let balance = services
//!     .read_with_fallback("sepolia", "get_balance", |reader| async move {
//!         use exec_core::ChainReader;
//!         reader.balance(alloy::primitives::Address::ZERO).await
//!     })
//!     .await?;
//! println!("balance: {}", balance);
//! # Ok(())
//! # }
//! ```

use crate::client::{RpcReader, RpcWriter};
use crate::config::ExecConfig;
use crate::error::{ConfigError, ExecError};
use crate::quote::{QuoteClient, QuoteRequest, SwapQuote};
use crate::submitter::{ConfirmStatus, NonceSafeSubmitter, SubmitOutcome};
use crate::traits::{ChainReader, ChainWriter, TxParams};
use crate::utils::{EndpointPool, HttpProber, ProxyCredential, ProxyPool, RetryAttempt, RetryPolicy};
use alloy::primitives::{Address, B256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ExecServices {
    config: ExecConfig,
    endpoints: HashMap<String, Arc<EndpointPool>>,
    proxies: Arc<ProxyPool>,
    submitter: NonceSafeSubmitter,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ExecServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecServices")
            .field("networks", &self.endpoints.keys().collect::<Vec<_>>())
            .field("proxies", &self.proxies.len())
            .finish_non_exhaustive()
    }
}

impl ExecServices {
    /// Loads the proxy file and builds every pool. Async because the
    /// optional warm-up is spawned onto the current runtime.
    pub async fn from_config(config: ExecConfig) -> Result<Self, ExecError> {
        let prober = Arc::new(HttpProber::from_policy(&config.proxy));
        let proxies = ProxyPool::load_from_source(&config.proxy_file, prober, config.proxy.clone())?;
        let warmup = config.warmup_on_start;

        let services = Self::with_proxy_pool(config, Arc::new(proxies), CancellationToken::new())?;
        if warmup && !services.proxies.is_empty() {
            info!("Warming up proxy health cache in the background");
            services.proxies.spawn_warmup(services.cancel.child_token());
        }
        Ok(services)
    }

    /// Builds the services around an existing proxy pool.
    pub fn with_proxy_pool(
        config: ExecConfig,
        proxies: Arc<ProxyPool>,
        cancel: CancellationToken,
    ) -> Result<Self, ExecError> {
        config.validate()?;

        if config.require_proxies && proxies.is_empty() {
            return Err(ConfigError::NoProxies.into());
        }

        let mut endpoints = HashMap::new();
        for (name, network) in &config.networks {
            let pool = EndpointPool::new(
                name.clone(),
                &network.rpc_urls,
                config.fallback.inter_attempt_delay(),
            )?;
            endpoints.insert(name.clone(), Arc::new(pool));
        }

        let submitter = NonceSafeSubmitter::new(config.submit.clone(), cancel.clone());

        Ok(Self {
            config,
            endpoints,
            proxies,
            submitter,
            cancel,
        })
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    pub fn submitter(&self) -> &NonceSafeSubmitter {
        &self.submitter
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels every wait currently running under these services.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn endpoint_pool(&self, network: &str) -> Result<&Arc<EndpointPool>, ExecError> {
        self.endpoints.get(network).ok_or_else(|| {
            ConfigError::UnknownNetwork {
                name: network.to_string(),
            }
            .into()
        })
    }

    /// Read client bound to the network's current endpoint.
    pub fn read_client(&self, network: &str) -> Result<RpcReader, ExecError> {
        RpcReader::connect(self.endpoint_pool(network)?.current())
    }

    /// Signing client bound to the network's current endpoint. The key is
    /// validated before any connection is attempted.
    pub fn write_client(&self, network: &str, private_key: &str) -> Result<RpcWriter, ExecError> {
        let pool = self.endpoint_pool(network)?;
        RpcWriter::from_private_key(pool.current(), private_key)
    }

    /// Runs `operation` with a fresh [`RpcReader`] per endpoint, failing
    /// over through the network's pool.
    pub async fn read_with_fallback<T, F, Fut>(
        &self,
        network: &str,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ExecError>
    where
        F: FnMut(RpcReader) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let pool = self.endpoint_pool(network)?;
        pool.execute_with_fallback(operation_name, None, &self.cancel, |url| {
            let call = RpcReader::connect(&url).map(&mut operation);
            async move {
                match call {
                    Ok(fut) => fut.await,
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await
    }

    /// `fast` never touches the network and may hand out an unprobed
    /// proxy. Otherwise candidates are probed until one answers; `None`
    /// when the pool is empty or nothing is reachable.
    pub async fn next_proxy(&self, fast: bool) -> Option<ProxyCredential> {
        if fast {
            return self.proxies.pick_fast_healthy().await;
        }

        let attempts = self.config.proxy.verify_max_attempts;
        match self.proxies.pick_verified_working(attempts, &self.cancel).await {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                warn!("No verified proxy available: {}", e);
                None
            }
        }
    }

    pub async fn submit(
        &self,
        reader: &dyn ChainReader,
        writer: &dyn ChainWriter,
        sender: Address,
        tx: &TxParams,
    ) -> SubmitOutcome {
        self.submitter.submit(reader, writer, sender, tx).await
    }

    /// Polls the receipt through the network's current endpoint.
    pub async fn confirm(&self, network: &str, hash: B256) -> Result<ConfirmStatus, ExecError> {
        let reader = self.read_client(network)?;
        self.submitter.confirm(&reader, hash).await
    }

    pub async fn with_retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation_name: &str,
        operation: F,
    ) -> Result<T, ExecError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        crate::utils::with_retry(policy, operation_name, &self.cancel, operation).await
    }

    pub fn quote_client(&self, base_url: &str) -> Result<QuoteClient, ExecError> {
        QuoteClient::from_config(base_url, &self.config.quote)
    }

    /// Quote fetch under the configured quote policy, rotating proxies per
    /// attempt when any are loaded.
    pub async fn fetch_quote(
        &self,
        client: &QuoteClient,
        request: &QuoteRequest,
    ) -> Result<SwapQuote, ExecError> {
        let policy = RetryPolicy::from(&self.config.quote);
        let proxies = (!self.proxies.is_empty()).then_some(&*self.proxies);
        client
            .fetch_with_retry(request, &policy, proxies, &self.cancel)
            .await
    }
}
