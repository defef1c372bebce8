//! Bounded retry driver shared by every idempotent external call
//! (quote fetches, status lookups).
//!
//! One [`RetryPolicy`] describes how many attempts to make, how long to wait
//! between them and which failures are worth another attempt. Each attempt
//! is a clean call: nothing from a failed attempt is carried into the next
//! one apart from the attempt counter.

use crate::config::QuoteConfig;
use crate::error::{ConfigError, ExecError, NetworkError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome class of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

pub type Classifier = fn(&anyhow::Error) -> RetryClass;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub classify: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            classify: classify_error,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            classify: classify_error,
        }
    }

    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    /// Fail fast: a single attempt, no delay.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl From<&QuoteConfig> for RetryPolicy {
    fn from(config: &QuoteConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}

/// State handed to each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl RetryAttempt {
    pub fn is_final(&self) -> bool {
        self.attempt_number == self.max_attempts
    }
}

/// Default classifier: configuration problems and client-side HTTP errors
/// (4xx other than 408/429) are terminal, everything else is retried.
pub fn classify_error(error: &anyhow::Error) -> RetryClass {
    for cause in error.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return RetryClass::Terminal;
        }
        if let Some(NetworkError::HttpError { status_code, .. }) =
            cause.downcast_ref::<NetworkError>()
        {
            if is_terminal_status(*status_code) {
                return RetryClass::Terminal;
            }
        }
        if let Some(status) = cause
            .downcast_ref::<reqwest::Error>()
            .and_then(|e| e.status())
        {
            if is_terminal_status(status.as_u16()) {
                return RetryClass::Terminal;
            }
        }
    }
    RetryClass::Retryable
}

fn is_terminal_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), ExecError> {
    if cancel.is_cancelled() {
        return Err(ExecError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(ExecError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Runs `operation` until it succeeds, hits a terminal error or the policy
/// runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ExecError>
where
    F: FnMut(RetryAttempt) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    with_retry_using(
        policy,
        operation_name,
        cancel,
        || async {},
        |(), attempt| operation(attempt),
    )
    .await
}

/// Like [`with_retry`], but asks `supplier` for a fresh resource (a proxy,
/// an endpoint) before every attempt and passes it to `operation`.
pub async fn with_retry_using<T, R, S, SFut, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut supplier: S,
    mut operation: F,
) -> Result<T, ExecError>
where
    S: FnMut() -> SFut,
    SFut: Future<Output = R>,
    F: FnMut(R, RetryAttempt) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = RetryAttempt {
        attempt_number: 1,
        max_attempts,
        last_error: None,
    };

    loop {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let resource = supplier().await;
        let error = match operation(resource, attempt.clone()).await {
            Ok(value) => {
                if attempt.attempt_number > 1 {
                    debug!(
                        "{} succeeded on attempt {}",
                        operation_name, attempt.attempt_number
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if (policy.classify)(&error) == RetryClass::Terminal {
            warn!(
                "{} FAILED with terminal error on attempt {}/{}: {:#}",
                operation_name, attempt.attempt_number, max_attempts, error
            );
            return Err(ExecError::Terminal {
                operation: operation_name.to_string(),
                attempt: attempt.attempt_number,
                source: error,
            });
        }

        if attempt.is_final() {
            warn!(
                "{} FAILED after {} attempts: {:#}",
                operation_name, max_attempts, error
            );
            return Err(ExecError::RetriesExhausted {
                operation: operation_name.to_string(),
                attempts: max_attempts,
                source: error,
            });
        }

        warn!(
            "{} failed (attempt {}/{}). Retrying in {:?}: {:#}",
            operation_name, attempt.attempt_number, max_attempts, policy.delay, error
        );

        sleep_or_cancel(policy.delay, cancel).await?;

        attempt = RetryAttempt {
            attempt_number: attempt.attempt_number + 1,
            max_attempts,
            last_error: Some(format!("{:#}", error)),
        };
    }
}
