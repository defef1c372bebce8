//! # Execution Configuration
//!
//! TOML-backed policy constants for the execution layer. Every field has a
//! default, so an empty file (or no file at all) yields a working setup.
//! Delays are stored in milliseconds and converted to [`Duration`] by the
//! accessor methods; tests set them to zero.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Endpoint set for one logical network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub inter_attempt_delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            inter_attempt_delay_ms: 1000,
        }
    }
}

impl FallbackConfig {
    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPolicyConfig {
    /// Cached health verdicts older than this are re-probed
    pub health_ttl_secs: u64,
    pub probe_timeout_ms: u64,
    /// IP-echo services used as probe targets, tried in order
    pub probe_urls: Vec<String>,
    pub verify_max_attempts: u32,
    pub verify_pause_ms: u64,
    pub probe_concurrency: usize,
    pub batch_pause_ms: u64,
}

impl Default for ProxyPolicyConfig {
    fn default() -> Self {
        Self {
            health_ttl_secs: 300,
            probe_timeout_ms: 10_000,
            probe_urls: vec![
                "https://api.ipify.org?format=json".to_string(),
                "https://httpbin.org/ip".to_string(),
                "https://icanhazip.com".to_string(),
            ],
            verify_max_attempts: 5,
            verify_pause_ms: 1000,
            probe_concurrency: 10,
            batch_pause_ms: 1000,
        }
    }
}

impl ProxyPolicyConfig {
    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn verify_pause(&self) -> Duration {
        Duration::from_millis(self.verify_pause_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    pub max_retries: u32,
    pub pending_poll_interval_ms: u64,
    pub pending_wait_ceiling_ms: u64,
    /// Pause after a nonce/replacement rejection
    pub nonce_cooldown_ms: u64,
    /// Pause after any other failed attempt
    pub failure_cooldown_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            pending_poll_interval_ms: 3000,
            pending_wait_ceiling_ms: 60_000,
            nonce_cooldown_ms: 30_000,
            failure_cooldown_ms: 15_000,
            receipt_poll_interval_ms: 2000,
            receipt_timeout_ms: 120_000,
        }
    }
}

impl SubmitConfig {
    /// Zero-delay policy, mostly useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            pending_poll_interval_ms: 0,
            pending_wait_ceiling_ms: 0,
            nonce_cooldown_ms: 0,
            failure_cooldown_ms: 0,
            receipt_poll_interval_ms: 0,
            receipt_timeout_ms: 0,
        }
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pending_poll_interval_ms)
    }

    pub fn pending_wait_ceiling(&self) -> Duration {
        Duration::from_millis(self.pending_wait_ceiling_ms)
    }

    pub fn nonce_cooldown(&self) -> Duration {
        Duration::from_millis(self.nonce_cooldown_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            request_timeout_ms: 15_000,
        }
    }
}

impl QuoteConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Top-level configuration for [`crate::ExecServices`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub proxy_file: String,
    /// Fail at startup when the proxy file yields no credentials
    pub require_proxies: bool,
    /// Probe every proxy in the background right after loading
    pub warmup_on_start: bool,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub fallback: FallbackConfig,
    pub proxy: ProxyPolicyConfig,
    pub submit: SubmitConfig,
    pub quote: QuoteConfig,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            proxy_file: "proxies.txt".to_string(),
            require_proxies: false,
            warmup_on_start: false,
            networks: default_networks(),
            fallback: FallbackConfig::default(),
            proxy: ProxyPolicyConfig::default(),
            submit: SubmitConfig::default(),
            quote: QuoteConfig::default(),
        }
    }
}

/// Hardcoded endpoint sets. Entries from a config file replace these per
/// network name; other defaults stay available.
pub fn default_networks() -> BTreeMap<String, NetworkConfig> {
    let mut networks = BTreeMap::new();
    networks.insert(
        "rise-testnet".to_string(),
        NetworkConfig {
            chain_id: 11155931,
            rpc_urls: vec!["https://testnet.riselabs.xyz".to_string()],
        },
    );
    networks.insert(
        "tempo-moderato".to_string(),
        NetworkConfig {
            chain_id: 42431,
            rpc_urls: vec!["https://rpc.moderato.tempo.xyz".to_string()],
        },
    );
    networks.insert(
        "sepolia".to_string(),
        NetworkConfig {
            chain_id: 11155111,
            rpc_urls: vec![
                "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
                "https://rpc.sepolia.org".to_string(),
                "https://sepolia.drpc.org".to_string(),
            ],
        },
    );
    networks.insert(
        "base-sepolia".to_string(),
        NetworkConfig {
            chain_id: 84532,
            rpc_urls: vec![
                "https://sepolia.base.org".to_string(),
                "https://base-sepolia-rpc.publicnode.com".to_string(),
            ],
        },
    );
    networks
}

impl ExecConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.exists() {
            return Err(ConfigError::FileNotFound { path: display });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: display.clone(),
            msg: e.to_string(),
        })?;

        Self::parse(&content, &display)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config: ExecConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            msg: e.to_string(),
        })?;

        // Networks given in the file override defaults by name only
        let mut merged = default_networks();
        merged.append(&mut config.networks);
        config.networks = merged;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, network) in &self.networks {
            if network.rpc_urls.iter().all(|u| u.trim().is_empty()) {
                return Err(invalid(
                    &format!("networks.{}.rpc_urls", name),
                    "at least one endpoint is required",
                ));
            }
        }
        if self.proxy.probe_urls.is_empty() {
            return Err(invalid("proxy.probe_urls", "must not be empty"));
        }
        if self.proxy.probe_concurrency == 0 {
            return Err(invalid("proxy.probe_concurrency", "must be at least 1"));
        }
        if self.proxy.verify_max_attempts == 0 {
            return Err(invalid("proxy.verify_max_attempts", "must be at least 1"));
        }
        if self.submit.max_retries == 0 {
            return Err(invalid("submit.max_retries", "must be at least 1"));
        }
        if self.quote.max_attempts == 0 {
            return Err(invalid("quote.max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork {
                name: name.to_string(),
            })
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
