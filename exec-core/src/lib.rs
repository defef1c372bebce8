//! # Exec Core - Resilient Execution Layer for EVM Automation
//!
//! This crate provides the infrastructure every protocol module relies on to
//! reach a chain and external HTTP APIs reliably.
//!
//! ## Modules
//!
//! - [`config`] - TOML configuration with per-network endpoints and policy constants
//! - [`error`] - Typed error handling with thiserror
//! - [`traits`] - Chain reader/writer and proxy prober seams
//! - [`client`] - Alloy JSON-RPC clients bound to one endpoint
//! - [`submitter`] - Nonce-safe transaction submission and hash recovery
//! - [`quote`] - Swap quote client with proxy rotation
//! - [`services`] - The service container handed to protocol modules
//! - `utils` - Endpoint pool, proxy pool, retry driver and logging

// Module declarations - internal modules marked pub(crate)
pub mod client;
pub mod config;
pub mod error;
pub mod quote;
pub mod services;
pub mod submitter;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use client::{parse_signer, RpcReader, RpcWriter};
pub use config::{
    ExecConfig, FallbackConfig, NetworkConfig, ProxyPolicyConfig, QuoteConfig, SubmitConfig,
};
pub use error::{ConfigError, ErrorKind, ExecError, NetworkError};
pub use quote::{min_amount_out, QuoteClient, QuoteRequest, SwapQuote};
pub use services::ExecServices;
pub use submitter::recovery::{recover_tx_hash, HashExtraction};
pub use submitter::{
    ConfirmStatus, NonceSafeSubmitter, SubmitOutcome, SubmitStatus, TransactionSafetyState,
};
pub use traits::{BlockTag, ChainReader, ChainWriter, ProxyProber, SendError, TxParams};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{
    classify_error, proxied_client, setup_logger, sleep_or_cancel, with_retry, with_retry_using,
    Classifier, EndpointHealth, EndpointPool, HttpProber, ProbeReport, ProxyCredential,
    ProxyHealthRecord, ProxyPool, ProxyPoolStats, RetryAttempt, RetryClass, RetryPolicy,
};
