//! Tests for the Etherscan client and the ERC-20 stage checker
//!
//! Etherscan is replaced by a wiremock server answering the proxy-module actions.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use transfer_verifier::explorer::{EtherscanClient, ExplorerError};
use transfer_verifier::validator::{Erc20StageChecker, Stage, StageChecker, StageSet};
use transfer_verifier::{CheckCode, CheckResult};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::*;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

const BLOCK: u64 = 19_000_000;
const BLOCK_TIME: u64 = 1_714_557_000;

fn build_checker(server: &MockServer) -> Erc20StageChecker {
    let config = build_erc20_config(&server.uri());
    let client = Arc::new(EtherscanClient::new(&config).unwrap());
    Erc20StageChecker::new(client, &config)
}

/// Mounts a mined USDT transfer of 5 USDT to `recipient` with `head - BLOCK` confirmations.
async fn mount_mined_transfer(server: &MockServer, recipient: &str, head: u64) {
    let input = erc20_transfer_input(recipient, 5_000_000);
    mount_eth_transaction(server, eth_transaction_json(DUMMY_TX_HASH_ERC, Some(BLOCK), USDT_ERC20, &input)).await;
    mount_eth_block(server, BLOCK_TIME).await;
    mount_eth_head(server, head).await;
}

// ============================================================================
// CLIENT TESTS
// ============================================================================

/// Test that an unknown hash is reported as absent
/// What is tested: Etherscan answers result=null
/// Why: The checker maps this to pending not_found, not an error
#[tokio::test]
async fn test_get_transaction_unknown_hash() {
    let server = MockServer::start().await;
    mount_eth_transaction(&server, serde_json::Value::Null).await;

    let client = EtherscanClient::new(&build_erc20_config(&server.uri())).unwrap();
    let tx = client.get_transaction(DUMMY_TX_HASH_ERC).await.unwrap();
    assert!(tx.is_none());
}

/// Test that HTTP 429 is retried
/// What is tested: First response 429, second response succeeds
/// Why: Explorers rate limit aggressively; a single 429 must not fail the check
#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_eth_head(&server, 42).await;

    let client = EtherscanClient::new(&build_erc20_config(&server.uri())).unwrap();
    assert_eq!(client.get_block_number().await.unwrap(), 42);
}

/// Test that an Etherscan rate limit body is retried
/// What is tested: HTTP 200 with status "0" and "Max rate limit reached"
/// Why: Etherscan signals rate limits in the body, not only with 429
#[tokio::test]
async fn test_rate_limit_body_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_eth_head(&server, 7).await;

    let client = EtherscanClient::new(&build_erc20_config(&server.uri())).unwrap();
    assert_eq!(client.get_block_number().await.unwrap(), 7);
}

/// Test that API errors are not retried
/// What is tested: NOTOK with an invalid key message
/// Why: Retrying a permanent error wastes the rate limit budget
#[tokio::test]
async fn test_api_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = EtherscanClient::new(&build_erc20_config(&server.uri())).unwrap();
    let err = client.get_block_number().await.unwrap_err();
    assert!(matches!(err, ExplorerError::Api(ref detail) if detail == "Invalid API Key"));
}

/// Test that persistent server errors exhaust the retries
/// What is tested: Every attempt answers 502
/// Why: The error must report that retries were used up
#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let client = EtherscanClient::new(&build_erc20_config(&server.uri())).unwrap();
    let err = client.get_block_number().await.unwrap_err();
    assert!(matches!(err, ExplorerError::RetriesExhausted { attempts: 3, .. }));
}

/// Test that the API key and chain id are sent as query parameters
/// What is tested: apikey and chainid appear in the request
/// Why: Etherscan authenticates by query parameter
#[tokio::test]
async fn test_api_key_and_chain_id_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("apikey", "secret-key"))
        .and(query_param("chainid", "1"))
        .and(query_param("module", "proxy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxy_body(json!("0x1"))))
        .expect(1)
        .mount(&server)
        .await;

    let env_name = format!("TEST_ETHERSCAN_KEY_{}", std::process::id());
    std::env::set_var(&env_name, "secret-key");
    let mut config = build_erc20_config(&server.uri());
    config.api_key_env = Some(env_name);
    config.chain_id = Some(1);

    let client = EtherscanClient::new(&config).unwrap();
    assert_eq!(client.get_block_number().await.unwrap(), 1);
}

// ============================================================================
// CHECKER TESTS
// ============================================================================

/// Test a fully confirmed transfer
/// What is tested: All five stages pass in one check
/// Why: The happy path must report amount, sender, time and confirmations
#[tokio::test]
async fn test_confirmed_transfer() {
    let server = MockServer::start().await;
    mount_mined_transfer(&server, DUMMY_TARGET_ADDR_EVM, BLOCK + 20).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;

    match result {
        CheckResult::Confirmed(details) => {
            assert_eq!(details.amount.unwrap().to_string(), "5.0");
            assert_eq!(details.counterparty.as_deref(), Some(DUMMY_SENDER_ADDR_EVM));
            assert_eq!(details.confirmations, Some(20));
            assert_eq!(details.timestamp.unwrap().timestamp(), BLOCK_TIME as i64);
        }
        other => panic!("expected confirmed, got {:?}", other),
    }
}

/// Test recipient comparison ignores case
/// What is tested: Target given in checksum case, calldata in lowercase
/// Why: EVM addresses are case-insensitive
#[tokio::test]
async fn test_recipient_case_insensitive() {
    let server = MockServer::start().await;
    let target = "0x8Ba1f109551bD432803012645Ac136ddd64DBA72";
    mount_mined_transfer(&server, target, BLOCK + 20).await;

    let result = build_checker(&server).check(DUMMY_TX_HASH_ERC, target, StageSet::all()).await;
    assert!(matches!(result, CheckResult::Confirmed(_)));
}

/// Test a transfer to the wrong address (scenario A)
/// What is tested: Decoded recipient differs from the target
/// Why: Must be a fatal invalid_recipient, not a pending result
#[tokio::test]
async fn test_wrong_recipient_fails() {
    let server = MockServer::start().await;
    mount_mined_transfer(&server, DUMMY_OTHER_ADDR_EVM, BLOCK + 20).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;

    match result {
        CheckResult::Failed { code, error, remaining } => {
            assert_eq!(code, CheckCode::InvalidRecipient);
            assert!(error.contains(DUMMY_OTHER_ADDR_EVM));
            assert!(!remaining.contains(Stage::InBlock));
            assert!(!remaining.contains(Stage::ExpectedToken));
        }
        other => panic!("expected failed, got {:?}", other),
    }
}

/// Test a transaction to another token contract
/// What is tested: tx.to is not the USDT contract
/// Why: Only the configured token counts
#[tokio::test]
async fn test_wrong_token_fails() {
    let server = MockServer::start().await;
    let input = erc20_transfer_input(DUMMY_TARGET_ADDR_EVM, 5_000_000);
    mount_eth_transaction(&server, eth_transaction_json(DUMMY_TX_HASH_ERC, Some(BLOCK), OTHER_TOKEN_ERC20, &input)).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    assert_eq!(result.code(), Some(CheckCode::InvalidToken));
    assert!(result.is_terminal());
}

/// Test a transaction still in the mempool
/// What is tested: blockNumber is null
/// Why: Must stay pending with every stage outstanding
#[tokio::test]
async fn test_not_in_block_is_pending() {
    let server = MockServer::start().await;
    let input = erc20_transfer_input(DUMMY_TARGET_ADDR_EVM, 5_000_000);
    mount_eth_transaction(&server, eth_transaction_json(DUMMY_TX_HASH_ERC, None, USDT_ERC20, &input)).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    assert_eq!(result.code(), Some(CheckCode::NotInBlock));
    assert_eq!(result.remaining(), StageSet::all());
}

/// Test a transfer with too few confirmations (scenario B, first check)
/// What is tested: head - block below the threshold
/// Why: Only the confirmation stage may remain, and details must already be known
#[tokio::test]
async fn test_low_confirmations_is_pending() {
    let server = MockServer::start().await;
    mount_mined_transfer(&server, DUMMY_TARGET_ADDR_EVM, BLOCK + 3).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;

    match result {
        CheckResult::Pending { code, remaining, details, .. } => {
            assert_eq!(code, CheckCode::LowConfirmations);
            assert_eq!(remaining.iter().collect::<Vec<_>>(), vec![Stage::Confirmations]);
            assert_eq!(details.confirmations, Some(3));
            assert!(details.amount.is_some());
        }
        other => panic!("expected pending, got {:?}", other),
    }
}

/// Test that a head below the transaction block yields zero confirmations
/// What is tested: Lagging explorer head
/// Why: Confirmations are floored at zero instead of underflowing
#[tokio::test]
async fn test_lagging_head_counts_zero() {
    let server = MockServer::start().await;
    mount_mined_transfer(&server, DUMMY_TARGET_ADDR_EVM, BLOCK - 2).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    match result {
        CheckResult::Pending { details, .. } => assert_eq!(details.confirmations, Some(0)),
        other => panic!("expected pending, got {:?}", other),
    }
}

/// Test that satisfied stages are skipped
/// What is tested: Only Confirmations outstanding while calldata is not a transfer
/// Why: A re-check resumes at the first unmet stage and does not re-verify earlier ones
#[tokio::test]
async fn test_satisfied_stages_are_skipped() {
    let server = MockServer::start().await;
    mount_eth_transaction(&server, eth_transaction_json(DUMMY_TX_HASH_ERC, Some(BLOCK), OTHER_TOKEN_ERC20, "0x")).await;
    mount_eth_head(&server, BLOCK + 30).await;

    let outstanding: StageSet = vec![Stage::Confirmations].into();
    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, outstanding)
        .await;
    assert!(matches!(result, CheckResult::Confirmed(ref d) if d.confirmations == Some(30)));
}

/// Test that a transport failure surfaces as pending (scenario C)
/// What is tested: Explorer slower than the client timeout on every attempt
/// Why: Transient outages must keep the record pending with api_error
#[tokio::test]
async fn test_timeout_is_pending_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(proxy_body(serde_json::Value::Null))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut config = build_erc20_config(&server.uri());
    config.request_timeout_ms = 100;
    let client = Arc::new(EtherscanClient::new(&config).unwrap());
    let checker = Erc20StageChecker::new(client, &config);

    let result = checker.check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all()).await;
    assert_eq!(result.code(), Some(CheckCode::ApiError));
    assert_eq!(result.remaining(), StageSet::all());
    assert!(!result.is_terminal());
}

/// Test that non-transfer calldata is a decode error
/// What is tested: Transaction to the token contract calling approve()
/// Why: Undecodable input must not be reported as a wrong recipient
#[tokio::test]
async fn test_non_transfer_calldata_is_decode_error() {
    let server = MockServer::start().await;
    let input = erc20_transfer_input(DUMMY_TARGET_ADDR_EVM, 1).replacen("a9059cbb", "095ea7b3", 1);
    mount_eth_transaction(&server, eth_transaction_json(DUMMY_TX_HASH_ERC, Some(BLOCK), USDT_ERC20, &input)).await;

    let result = build_checker(&server)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    assert_eq!(result.code(), Some(CheckCode::DecodeError));
    assert!(result.remaining().contains(Stage::Recipient));
}

/// Test the confirmation threshold boundary
/// What is tested: threshold - 1 confirmations stay pending, threshold confirms
/// Why: The stage passes exactly when confirmations reach the configured count
#[tokio::test]
async fn test_confirmation_threshold_boundary() {
    let below = MockServer::start().await;
    mount_mined_transfer(&below, DUMMY_TARGET_ADDR_EVM, BLOCK + ERC20_CONFIRMATIONS - 1).await;
    let result = build_checker(&below)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    assert_eq!(result.code(), Some(CheckCode::LowConfirmations));

    let at = MockServer::start().await;
    mount_mined_transfer(&at, DUMMY_TARGET_ADDR_EVM, BLOCK + ERC20_CONFIRMATIONS).await;
    let result = build_checker(&at)
        .check(DUMMY_TX_HASH_ERC, DUMMY_TARGET_ADDR_EVM, StageSet::all())
        .await;
    assert!(matches!(result, CheckResult::Confirmed(ref d) if d.confirmations == Some(ERC20_CONFIRMATIONS)));
}
