//! Proxy health probing over HTTP.
//!
//! A proxy is healthy when any of the configured IP-echo services answers
//! with a 2xx status through it. Clients are cached per proxy so repeated
//! probes reuse connections.

use crate::config::ProxyPolicyConfig;
use crate::error::NetworkError;
use crate::traits::ProxyProber;
use crate::utils::proxy_pool::ProxyCredential;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct HttpProber {
    probe_urls: Vec<String>,
    timeout: Duration,
    clients: RwLock<HashMap<String, Client>>,
}

impl HttpProber {
    pub fn new(probe_urls: Vec<String>, timeout: Duration) -> Self {
        Self {
            probe_urls,
            timeout,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_policy(policy: &ProxyPolicyConfig) -> Self {
        Self::new(policy.probe_urls.clone(), policy.probe_timeout())
    }

    async fn client_for(&self, proxy: &ProxyCredential) -> Result<Client, NetworkError> {
        let key = proxy.key();
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let client = proxied_client(proxy, self.timeout)?;
        self.clients.write().await.insert(key, client.clone());
        Ok(client)
    }
}

/// Builds a reqwest client that routes every request through `proxy`.
pub fn proxied_client(proxy: &ProxyCredential, timeout: Duration) -> Result<Client, NetworkError> {
    Client::builder()
        .proxy(proxy.to_reqwest_proxy()?)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .build()
        .map_err(|e| NetworkError::ProxyBuild {
            proxy: proxy.key(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl ProxyProber for HttpProber {
    async fn probe(&self, proxy: &ProxyCredential) -> bool {
        let client = match self.client_for(proxy).await {
            Ok(c) => c,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };

        for url in &self.probe_urls {
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => debug!("Probe {} via {} returned {}", url, proxy, resp.status()),
                Err(e) => debug!("Probe {} via {} failed: {}", url, proxy, e),
            }
        }
        false
    }
}
