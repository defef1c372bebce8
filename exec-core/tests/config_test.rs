use exec_core::{ConfigError, ExecConfig};
use std::io::Write;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.proxy_file, "proxies.txt");
        assert!(!config.require_proxies);
        assert_eq!(config.proxy.health_ttl(), Duration::from_secs(300));
        assert_eq!(config.proxy.probe_urls.len(), 3);
        assert_eq!(config.submit.max_retries, 3);
        assert_eq!(config.submit.pending_wait_ceiling(), Duration::from_secs(60));
        assert_eq!(config.submit.nonce_cooldown(), Duration::from_secs(30));
        assert_eq!(config.submit.failure_cooldown(), Duration::from_secs(15));
        assert_eq!(config.fallback.inter_attempt_delay(), Duration::from_secs(1));
        assert_eq!(config.quote.request_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ExecConfig::from_toml_str("").unwrap();
        assert!(config.networks.contains_key("sepolia"));
        assert!(config.networks.contains_key("rise-testnet"));
    }

    #[test]
    fn test_networks_merge_over_defaults() {
        let config = ExecConfig::from_toml_str(
            r#"
            [networks.sepolia]
            chain_id = 11155111
            rpc_urls = ["https://my-node.example"]

            [networks.anvil]
            chain_id = 31337
            rpc_urls = ["http://127.0.0.1:8545"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.network("sepolia").unwrap().rpc_urls,
            vec!["https://my-node.example".to_string()]
        );
        assert_eq!(config.network("anvil").unwrap().chain_id, 31337);
        // Untouched defaults stay available
        assert_eq!(config.network("base-sepolia").unwrap().rpc_urls.len(), 2);
        assert!(matches!(
            config.network("mainnet"),
            Err(ConfigError::UnknownNetwork { .. })
        ));
    }

    #[test]
    fn test_partial_sections() {
        let config = ExecConfig::from_toml_str(
            r#"
            require_proxies = true

            [submit]
            max_retries = 5
            nonce_cooldown_ms = 100

            [proxy]
            probe_concurrency = 25
            "#,
        )
        .unwrap();

        assert!(config.require_proxies);
        assert_eq!(config.submit.max_retries, 5);
        assert_eq!(config.submit.nonce_cooldown(), Duration::from_millis(100));
        // Fields not given keep their defaults
        assert_eq!(config.submit.failure_cooldown_ms, 15_000);
        assert_eq!(config.proxy.probe_concurrency, 25);
        assert_eq!(config.proxy.verify_max_attempts, 5);
    }

    #[test]
    fn test_validation_rejects_zero_counts() {
        let err = ExecConfig::from_toml_str("[submit]\nmax_retries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "submit.max_retries"));

        let err = ExecConfig::from_toml_str("[proxy]\nprobe_concurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ExecConfig::from_toml_str("[proxy]\nprobe_urls = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validation_rejects_network_without_endpoints() {
        let err = ExecConfig::from_toml_str(
            "[networks.empty]\nchain_id = 1\nrpc_urls = [\"  \"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field.contains("empty")));
    }

    #[test]
    fn test_parse_error_reported() {
        let err = ExecConfig::from_toml_str("require_proxies = \"maybe\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proxy_file = \"config/proxies.txt\"").unwrap();
        writeln!(file, "[quote]").unwrap();
        writeln!(file, "max_attempts = 4").unwrap();

        let config = ExecConfig::load(file.path()).unwrap();
        assert_eq!(config.proxy_file, "config/proxies.txt");
        assert_eq!(config.quote.max_attempts, 4);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ExecConfig::load("/no/such/exec.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
