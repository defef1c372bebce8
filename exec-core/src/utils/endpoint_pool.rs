//! # Endpoint Pool
//!
//! Ordered failover over interchangeable endpoints serving one logical
//! target (a chain's RPC set, a quote API mirror list).
//!
//! The pool keeps a cursor. [`EndpointPool::current`] reads it,
//! [`EndpointPool::advance`] moves it forward and reports exhaustion once it
//! runs past the last endpoint. Exhaustion means "no more fallbacks", not
//! "retry later".
//!
//! Failure counters and the healthy flag are for monitoring only. Failover
//! order is always the configured order; an endpoint marked unhealthy is
//! still tried when the cursor reaches it.

use crate::error::{ConfigError, ExecError};
use crate::utils::retry::sleep_or_cancel;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const UNHEALTHY_AFTER_FAILURES: u64 = 3;

/// Endpoint URL plus its failure bookkeeping
#[derive(Debug)]
pub struct Endpoint {
    pub url: String,
    failure_count: AtomicU64,
    healthy: AtomicBool,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            failure_count: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }
}

/// Health status of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub url: String,
    pub healthy: bool,
    pub failure_count: u64,
}

#[derive(Debug)]
pub struct EndpointPool {
    target: String,
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
    retry_delay: Duration,
}

impl EndpointPool {
    /// Builds a pool from `urls`, trimming blanks and dropping duplicates
    /// while keeping the original order.
    pub fn new(
        target: impl Into<String>,
        urls: &[String],
        retry_delay: Duration,
    ) -> Result<Self, ConfigError> {
        let target = target.into();
        let mut endpoints: Vec<Endpoint> = Vec::with_capacity(urls.len());

        for url in urls {
            let url = url.trim();
            if url.is_empty() || endpoints.iter().any(|e| e.url == url) {
                continue;
            }
            endpoints.push(Endpoint::new(url.to_string()));
        }

        if endpoints.is_empty() {
            return Err(ConfigError::MissingField {
                field: format!("{}.rpc_urls", target),
            });
        }

        debug!("Endpoint pool '{}' with {} endpoints", target, endpoints.len());

        Ok(Self {
            target,
            endpoints,
            cursor: AtomicUsize::new(0),
            retry_delay,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Endpoint at the cursor, or the first one if the cursor is out of range.
    pub fn current(&self) -> &str {
        let idx = self.cursor.load(Ordering::SeqCst);
        self.endpoints
            .get(idx)
            .unwrap_or(&self.endpoints[0])
            .url
            .as_str()
    }

    /// Moves the cursor forward. `None` means the pool is exhausted.
    pub fn advance(&self) -> Option<&str> {
        let len = self.endpoints.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idx| {
                Some((idx + 1).min(len))
            })
            .unwrap_or(len);

        let next = (previous + 1).min(len);
        match self.endpoints.get(next) {
            Some(endpoint) => {
                debug!("{}: switching to endpoint {}", self.target, endpoint.url);
                Some(endpoint.url.as_str())
            }
            None => None,
        }
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
    }

    /// Read-only snapshot of every endpoint in order.
    pub fn all(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.url.clone()).collect()
    }

    pub fn record_success(&self, url: &str) {
        if let Some(endpoint) = self.find(url) {
            endpoint.failure_count.store(0, Ordering::SeqCst);
            endpoint.healthy.store(true, Ordering::SeqCst);
        }
    }

    pub fn record_failure(&self, url: &str) {
        if let Some(endpoint) = self.find(url) {
            let failures = endpoint.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= UNHEALTHY_AFTER_FAILURES && endpoint.healthy.swap(false, Ordering::SeqCst)
            {
                warn!(
                    "Marking endpoint {} as unhealthy after {} failures",
                    url, failures
                );
            }
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_healthy()).count()
    }

    /// Snapshot for monitoring; does not influence [`EndpointPool::current`].
    pub fn health_status(&self) -> Vec<EndpointHealth> {
        self.endpoints
            .iter()
            .map(|e| EndpointHealth {
                url: e.url.clone(),
                healthy: e.is_healthy(),
                failure_count: e.failures(),
            })
            .collect()
    }

    fn find(&self, url: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.url == url)
    }

    /// Runs `operation` against the current endpoint, failing over to the
    /// next one after each error. Attempts default to the pool size.
    ///
    /// Success returns immediately. When the pool runs out, the cursor is
    /// reset for the next caller and [`ExecError::PoolExhausted`] carries the
    /// last underlying error.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        operation_name: &str,
        max_attempts: Option<usize>,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ExecError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = max_attempts.unwrap_or(self.len()).max(1);
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }

            let url = self.current().to_string();
            attempts += 1;

            let error = match operation(url.clone()).await {
                Ok(value) => {
                    self.record_success(&url);
                    return Ok(value);
                }
                Err(e) => e,
            };

            self.record_failure(&url);
            warn!(
                "{} failed on {} (attempt {}/{}): {:#}",
                operation_name, url, attempts, max_attempts, error
            );

            if attempts >= max_attempts || self.advance().is_none() {
                info!(
                    "{}: no more fallbacks for '{}' after {} attempts",
                    operation_name, self.target, attempts
                );
                self.reset();
                return Err(ExecError::PoolExhausted {
                    target: self.target.clone(),
                    attempts,
                    source: error,
                });
            }

            sleep_or_cancel(self.retry_delay, cancel).await?;
        }
    }
}
