//! # Utilities Module
//!
//! Internal building blocks of the execution layer.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod endpoint_pool;
pub(crate) mod logger;
pub(crate) mod proxy_health;
pub(crate) mod proxy_pool;
pub(crate) mod retry;

// Selective exports - only public utilities
pub use endpoint_pool::{EndpointHealth, EndpointPool};
pub use logger::setup_logger;
pub use proxy_health::{proxied_client, HttpProber};
pub use proxy_pool::{ProbeReport, ProxyCredential, ProxyHealthRecord, ProxyPool, ProxyPoolStats};
pub use retry::{
    classify_error, sleep_or_cancel, with_retry, with_retry_using, Classifier, RetryAttempt,
    RetryClass, RetryPolicy,
};
