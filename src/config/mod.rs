//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the transfer verifier service.
//! Configuration includes explorer endpoints, token contracts, confirmation thresholds,
//! pending-record storage and the API server.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::validator::Chain;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "TRANSFER_VERIFIER_CONFIG_PATH";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/verifier.toml";

/// Mainnet USDT contract on Ethereum.
pub const USDT_ERC20_CONTRACT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// Mainnet USDT contract on Tron.
pub const USDT_TRC20_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - The pending-record poller (interval, pending window, concurrency)
/// - Pending-record storage (Redis or in-memory)
/// - The ERC-20 and TRC-20 explorers (each optional)
/// - API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Poller and check settings
    pub service: ServiceConfig,
    /// Pending-record storage settings
    pub storage: StorageConfig,
    /// ERC-20 (Ethereum) chain configuration, checked through Etherscan
    #[serde(default)]
    pub erc20: Option<ChainConfig>,
    /// TRC-20 (Tron) chain configuration, checked through Tronscan
    #[serde(default)]
    pub trc20: Option<ChainConfig>,
    /// API server configuration (host, port)
    pub api: ApiConfig,
}

/// Poller and check settings shared by all chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interval between sweeps of the pending store in milliseconds
    pub polling_interval_ms: u64,
    /// How long a record may stay pending before it expires, in seconds
    pub max_pending_secs: u64,
    /// Upper bound on records checked concurrently within one sweep
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    /// Lifetime of a per-record check lock in milliseconds
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
}

/// Pending-record storage settings.
///
/// When `redis_url` is absent the service keeps records in memory, which
/// loses them on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379/0")
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Key prefix for pending records
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Safety TTL on stored records in seconds; must exceed `max_pending_secs`
    pub record_ttl_secs: u64,
}

/// Configuration for one chain's block-explorer access and token rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Explorer API base URL (e.g., "https://api.etherscan.io/api")
    pub explorer_url: String,
    /// Name of the environment variable holding the explorer API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// EVM chain id, passed to multi-chain explorer endpoints when set
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Expected token contract address
    pub token_contract: String,
    /// Token decimals used to scale raw amounts
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    /// Confirmations required before a transfer counts as final
    pub required_confirmations: u64,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Minimum delay between two requests to the explorer in milliseconds
    #[serde(default)]
    pub min_request_interval_ms: u64,
    /// Maximum number of in-flight requests to the explorer
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Retry behaviour for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry behaviour for explorer requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds, doubled per attempt
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4_000,
        }
    }
}

/// API server configuration for external communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
}

fn default_max_concurrent_checks() -> usize {
    8
}

fn default_lock_ttl_ms() -> u64 {
    30_000
}

fn default_key_prefix() -> String {
    "tx".to_string()
}

fn default_token_decimals() -> u8 {
    6
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent_requests() -> usize {
    4
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Loads configuration from the TOML file.
    ///
    /// The path is resolved in this order:
    /// 1. `path` argument (from the command line)
    /// 2. `TRANSFER_VERIFIER_CONFIG_PATH` environment variable
    /// 3. `config/verifier.toml`
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - File missing, unparsable or invalid
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_string(),
            None => std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        };

        if !Path::new(&config_path).exists() {
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/verifier.template.toml config/verifier.toml\n\
                Then edit config/verifier.toml with your actual values.",
                config_path
            ));
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", config_path))?;
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.erc20.is_some() || self.trc20.is_some(),
            "At least one of [erc20] or [trc20] must be configured"
        );
        ensure!(self.service.polling_interval_ms > 0, "service.polling_interval_ms must be positive");
        ensure!(self.service.max_pending_secs > 0, "service.max_pending_secs must be positive");
        ensure!(self.service.max_concurrent_checks > 0, "service.max_concurrent_checks must be positive");
        ensure!(
            self.storage.record_ttl_secs > self.service.max_pending_secs,
            "storage.record_ttl_secs ({}) must exceed service.max_pending_secs ({})",
            self.storage.record_ttl_secs,
            self.service.max_pending_secs
        );

        for chain in Chain::ALL {
            let Some(chain_config) = self.chain(chain) else {
                continue;
            };
            ensure!(
                !chain_config.explorer_url.is_empty(),
                "{}.explorer_url must not be empty",
                chain
            );
            url::Url::parse(&chain_config.explorer_url)
                .with_context(|| format!("{}.explorer_url is not a valid URL", chain))?;
            ensure!(
                chain_config.token_decimals <= 38,
                "{}.token_decimals must be at most 38",
                chain
            );
            ensure!(
                chain_config.retry.max_attempts > 0,
                "{}.retry.max_attempts must be positive",
                chain
            );
            ensure!(
                chain_config.max_concurrent_requests > 0,
                "{}.max_concurrent_requests must be positive",
                chain
            );
        }
        Ok(())
    }

    /// Returns the configuration for `chain`, if that chain is enabled.
    pub fn chain(&self, chain: Chain) -> Option<&ChainConfig> {
        match chain {
            Chain::Erc20 => self.erc20.as_ref(),
            Chain::Trc20 => self.trc20.as_ref(),
        }
    }

    /// Creates a default configuration with public mainnet explorers.
    ///
    /// Suitable for local development; records are kept in memory.
    #[allow(dead_code)]
    pub fn default() -> Self {
        Self {
            service: ServiceConfig {
                polling_interval_ms: 60_000,
                max_pending_secs: 2 * 60 * 60,
                max_concurrent_checks: default_max_concurrent_checks(),
                lock_ttl_ms: default_lock_ttl_ms(),
            },
            storage: StorageConfig {
                redis_url: None,
                key_prefix: default_key_prefix(),
                record_ttl_secs: 3 * 60 * 60,
            },
            erc20: Some(ChainConfig {
                explorer_url: "https://api.etherscan.io/api".to_string(),
                api_key_env: Some("ETHERSCAN_API_KEY".to_string()),
                chain_id: None,
                token_contract: USDT_ERC20_CONTRACT.to_string(),
                token_decimals: 6,
                required_confirmations: 12,
                request_timeout_ms: default_request_timeout_ms(),
                min_request_interval_ms: 200,
                max_concurrent_requests: default_max_concurrent_requests(),
                retry: RetryConfig::default(),
            }),
            trc20: Some(ChainConfig {
                explorer_url: "https://apilist.tronscanapi.com/api".to_string(),
                api_key_env: Some("TRONSCAN_API_KEY".to_string()),
                chain_id: None,
                token_contract: USDT_TRC20_CONTRACT.to_string(),
                token_decimals: 6,
                required_confirmations: 19,
                request_timeout_ms: default_request_timeout_ms(),
                min_request_interval_ms: 200,
                max_concurrent_requests: default_max_concurrent_requests(),
                retry: RetryConfig::default(),
            }),
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 3340,
            },
        }
    }
}

impl ServiceConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn max_pending(&self) -> Duration {
        Duration::from_secs(self.max_pending_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

impl ChainConfig {
    /// Reads the explorer API key from the configured environment variable.
    ///
    /// A missing or empty variable yields `None`; explorers then run on their
    /// anonymous rate limits.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}
