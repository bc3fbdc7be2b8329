//! Unit tests for configuration loading and validation

use std::time::Duration;
use transfer_verifier::config::Config;
use transfer_verifier::validator::Chain;

const VALID_CONFIG: &str = r#"
[service]
polling_interval_ms = 60000
max_pending_secs = 7200

[storage]
record_ttl_secs = 10800

[erc20]
explorer_url = "https://api.etherscan.io/api"
api_key_env = "ETHERSCAN_API_KEY"
token_contract = "0xdac17f958d2ee523a2206206994597c13d831ec7"
required_confirmations = 12

[trc20]
explorer_url = "https://apilist.tronscanapi.com/api"
token_contract = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
required_confirmations = 19

[api]
host = "127.0.0.1"
port = 3340
"#;

/// Test that a minimal configuration parses and fills in defaults
/// What is tested: Optional fields take their documented defaults
/// Why: Operators should only need to set what differs from the defaults
#[test]
fn test_minimal_config_defaults() {
    let config = Config::from_toml_str(VALID_CONFIG).unwrap();

    assert_eq!(config.storage.key_prefix, "tx");
    assert!(config.storage.redis_url.is_none());
    assert_eq!(config.service.max_concurrent_checks, 8);
    assert_eq!(config.service.lock_ttl(), Duration::from_secs(30));
    assert_eq!(config.service.max_pending(), Duration::from_secs(7200));

    let erc20 = config.chain(Chain::Erc20).unwrap();
    assert_eq!(erc20.token_decimals, 6);
    assert_eq!(erc20.request_timeout_ms, 10_000);
    assert_eq!(erc20.retry.max_attempts, 3);
    assert_eq!(config.chain(Chain::Trc20).unwrap().required_confirmations, 19);
}

/// Test that the store TTL must exceed the pending window
/// What is tested: record_ttl_secs <= max_pending_secs is rejected
/// Why: Records would vanish from the store before they could expire properly
#[test]
fn test_ttl_must_exceed_pending_window() {
    let config = VALID_CONFIG.replace("record_ttl_secs = 10800", "record_ttl_secs = 7200");
    let err = Config::from_toml_str(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("record_ttl_secs"));
}

/// Test that at least one chain must be enabled
/// What is tested: A configuration without [erc20] and [trc20] is rejected
/// Why: The service would have nothing to check
#[test]
fn test_requires_a_chain() {
    let without_chains: String = VALID_CONFIG
        .split("[api]")
        .next()
        .unwrap()
        .split("[erc20]")
        .next()
        .unwrap()
        .to_string()
        + "[api]\nhost = \"127.0.0.1\"\nport = 3340\n";
    let err = Config::from_toml_str(&without_chains).unwrap_err();
    assert!(format!("{:#}", err).contains("At least one"));
}

/// Test that a single chain is enough
/// What is tested: Only [trc20] configured
/// Why: Deployments may accept one network only
#[test]
fn test_single_chain() {
    let start = VALID_CONFIG.find("[erc20]").unwrap();
    let end = VALID_CONFIG.find("[trc20]").unwrap();
    let trc_only = format!("{}{}", &VALID_CONFIG[..start], &VALID_CONFIG[end..]);
    let config = Config::from_toml_str(&trc_only).unwrap();
    assert!(config.chain(Chain::Erc20).is_none());
    assert!(config.chain(Chain::Trc20).is_some());
}

/// Test that invalid explorer URLs are rejected
/// What is tested: explorer_url must parse as a URL
/// Why: Misconfigured URLs should fail at startup, not on the first check
#[test]
fn test_invalid_explorer_url() {
    let config = VALID_CONFIG.replace("https://api.etherscan.io/api", "not a url");
    assert!(Config::from_toml_str(&config).is_err());
}

/// Test loading from an explicit path
/// What is tested: Config::load with a path argument reads that file
/// Why: The --config flag takes priority over the environment variable
#[test]
fn test_load_from_path() {
    let path = std::env::temp_dir().join(format!("transfer-verifier-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, VALID_CONFIG).unwrap();

    let config = Config::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(config.api.port, 3340);

    std::fs::remove_file(&path).unwrap();
}

/// Test that a missing file produces a helpful error
/// What is tested: Config::load with a nonexistent path
/// Why: Users need to know to copy the template
#[test]
fn test_load_missing_file() {
    let err = Config::load(Some("/nonexistent/verifier.toml")).unwrap_err();
    assert!(err.to_string().contains("verifier.template.toml"));
}

/// Test that the built-in defaults are valid
/// What is tested: Config::default() passes validation
/// Why: Development setups start from the defaults
#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    config.validate().unwrap();
    assert!(config.storage.record_ttl_secs > config.service.max_pending_secs);
}

/// Test that the memory store is used without a Redis URL
/// What is tested: open_store with storage.redis_url unset
/// Why: Local runs and tests work without a Redis server
#[test]
fn test_memory_store_without_redis_url() {
    let config = Config::from_toml_str(VALID_CONFIG).unwrap();
    let store = tokio_test::block_on(transfer_verifier::storage::open_store(&config.storage)).unwrap();
    let records = tokio_test::block_on(store.scan_all(Chain::Erc20)).unwrap();
    assert!(records.is_empty());
}
