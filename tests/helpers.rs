//! Shared test helpers
//!
//! The module is organized into several categories:
//! - **Constants**: Dummy hashes and addresses for both chains
//! - **Configuration Builders**: Test configurations pointing at mock servers
//! - **Explorer Mocks**: wiremock responders for Etherscan and Tronscan
//! - **Fakes**: Scripted stage checker and recording side effects

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transfer_verifier::config::{ApiConfig, ChainConfig, Config, RetryConfig, ServiceConfig, StorageConfig};
use transfer_verifier::effects::{
    ConversationDriver, NextStep, Notice, Outcome, OutcomeLedger, RequesterNotifier, SideEffects,
};
use transfer_verifier::storage::{MemoryPendingStore, TransactionRecord};
use transfer_verifier::validator::{Chain, CheckCode, CheckResult, StageChecker, StageSet, TransferDetails};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- HASHES --------------------------------

/// Dummy ERC-20 transaction hash (0x + 64 hex)
pub const DUMMY_TX_HASH_ERC: &str = "0x00000000000000000000000000000000000000000000000000000000000000e1";

/// Second dummy ERC-20 transaction hash
pub const DUMMY_TX_HASH_ERC_2: &str = "0x00000000000000000000000000000000000000000000000000000000000000e2";

/// Dummy TRC-20 transaction hash (64 hex, no prefix)
pub const DUMMY_TX_HASH_TRC: &str = "00000000000000000000000000000000000000000000000000000000000000f1";

// ------------------------------ ADDRESSES -------------------------------

/// Address issued to the requester (EVM format)
pub const DUMMY_TARGET_ADDR_EVM: &str = "0x0000000000000000000000000000000000000001";

/// Some other EVM address
pub const DUMMY_OTHER_ADDR_EVM: &str = "0x0000000000000000000000000000000000000002";

/// Sender of the transfer (EVM format)
pub const DUMMY_SENDER_ADDR_EVM: &str = "0x0000000000000000000000000000000000000003";

/// Address issued to the requester (Tron base58)
pub const DUMMY_TARGET_ADDR_TRON: &str = "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf";

/// Some other Tron address
pub const DUMMY_OTHER_ADDR_TRON: &str = "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL";

/// Sender of the transfer (Tron base58)
pub const DUMMY_SENDER_ADDR_TRON: &str = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8";

// ------------------------- TOKENS AND CONTRACTS -------------------------

pub const USDT_ERC20: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

pub const USDT_TRC20: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// Some other ERC-20 token (USDC)
pub const OTHER_TOKEN_ERC20: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

/// Some other TRC-20 token (USDC)
pub const OTHER_TOKEN_TRC20: &str = "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8";

pub const ERC20_CONFIRMATIONS: u64 = 12;

pub const TRC20_CONFIRMATIONS: u64 = 19;

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

/// Explorer settings with fast retries, suitable for mock servers.
pub fn build_chain_config(explorer_url: &str, token_contract: &str, required_confirmations: u64) -> ChainConfig {
    ChainConfig {
        explorer_url: explorer_url.to_string(),
        api_key_env: None,
        chain_id: None,
        token_contract: token_contract.to_string(),
        token_decimals: 6,
        required_confirmations,
        request_timeout_ms: 2_000,
        min_request_interval_ms: 0,
        max_concurrent_requests: 4,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    }
}

/// Etherscan settings for a mock server (`{uri}/api`).
pub fn build_erc20_config(server_uri: &str) -> ChainConfig {
    build_chain_config(&format!("{}/api", server_uri), USDT_ERC20, ERC20_CONFIRMATIONS)
}

/// Tronscan settings for a mock server (`{uri}/api`).
pub fn build_trc20_config(server_uri: &str) -> ChainConfig {
    build_chain_config(&format!("{}/api", server_uri), USDT_TRC20, TRC20_CONFIRMATIONS)
}

/// Full service configuration with both chains pointing at `server_uri`.
pub fn build_test_config(server_uri: &str) -> Config {
    Config {
        service: ServiceConfig {
            polling_interval_ms: 50,
            max_pending_secs: 2 * 60 * 60,
            max_concurrent_checks: 4,
            lock_ttl_ms: 30_000,
        },
        storage: StorageConfig {
            redis_url: None,
            key_prefix: "tx".to_string(),
            record_ttl_secs: 3 * 60 * 60,
        },
        erc20: Some(build_erc20_config(server_uri)),
        trc20: Some(build_trc20_config(server_uri)),
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    }
}

/// In-memory store with the default key prefix and a 3 hour TTL.
pub fn build_memory_store() -> Arc<MemoryPendingStore> {
    Arc::new(MemoryPendingStore::new("tx", Duration::from_secs(3 * 60 * 60)))
}

/// A fresh pending record with every stage outstanding.
pub fn build_pending_record(chain: Chain, tx_hash: &str, target_address: &str, first_seen: DateTime<Utc>) -> TransactionRecord {
    TransactionRecord {
        tx_hash: tx_hash.to_string(),
        chain,
        target_address: target_address.to_string(),
        requester_id: "requester-1".to_string(),
        conversation_ref: json!({"chat_id": 1001}),
        locale: "en".to_string(),
        claimed_amount: Some("5".to_string()),
        outstanding_stages: StageSet::all(),
        last_error_code: None,
        last_error_text: None,
        details: TransferDetails::default(),
        first_seen,
    }
}

// ============================================================================
// EXPLORER MOCKS
// ============================================================================

/// Calldata of `transfer(recipient, amount)`.
pub fn erc20_transfer_input(recipient: &str, amount: u128) -> String {
    format!(
        "0xa9059cbb{:0>64}{:064x}",
        recipient.trim_start_matches("0x").to_ascii_lowercase(),
        amount
    )
}

/// Etherscan transaction object.
pub fn eth_transaction_json(tx_hash: &str, block: Option<u64>, to: &str, input: &str) -> serde_json::Value {
    json!({
        "hash": tx_hash,
        "blockNumber": block.map(|b| format!("0x{:x}", b)),
        "from": DUMMY_SENDER_ADDR_EVM,
        "to": to,
        "input": input,
        "value": "0x0"
    })
}

/// Wraps a value the way Etherscan's proxy module does.
pub fn proxy_body(result: serde_json::Value) -> serde_json::Value {
    json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

/// Mounts an `eth_getTransactionByHash` responder.
pub async fn mount_eth_transaction(server: &MockServer, tx: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "eth_getTransactionByHash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxy_body(tx)))
        .mount(server)
        .await;
}

/// Mounts an `eth_getBlockByNumber` responder returning `timestamp` for every block.
pub async fn mount_eth_block(server: &MockServer, timestamp: u64) {
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "eth_getBlockByNumber"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(proxy_body(json!({"timestamp": format!("0x{:x}", timestamp)}))),
        )
        .mount(server)
        .await;
}

/// Mounts an `eth_blockNumber` responder.
pub async fn mount_eth_head(server: &MockServer, head: u64) {
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxy_body(json!(format!("0x{:x}", head)))))
        .mount(server)
        .await;
}

/// Tronscan transaction-info body with one transfer.
pub fn tron_info_json(
    confirmed: bool,
    confirmations: u64,
    contract_ret: &str,
    token: &str,
    to: &str,
    amount_str: &str,
) -> serde_json::Value {
    json!({
        "hash": DUMMY_TX_HASH_TRC,
        "confirmed": confirmed,
        "confirmations": confirmations,
        "contractRet": contract_ret,
        "timestamp": 1_714_557_000_000i64,
        "ownerAddress": DUMMY_SENDER_ADDR_TRON,
        "trc20TransferInfo": [{
            "contract_address": token,
            "from_address": DUMMY_SENDER_ADDR_TRON,
            "to_address": to,
            "amount_str": amount_str,
            "decimals": 6
        }]
    })
}

/// Mounts a Tronscan transaction-info responder.
pub async fn mount_tron_info(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/transaction-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// FAKES
// ============================================================================

/// Stage checker that replays scripted results per transaction hash.
///
/// Once a hash's script is exhausted it answers `Pending(not_found)` with the
/// stages it was given. Records every `outstanding` set it is called with.
pub struct ScriptedChecker {
    chain: Chain,
    scripts: Mutex<HashMap<String, VecDeque<CheckResult>>>,
    calls: Mutex<Vec<(String, StageSet)>>,
    panic_on: Option<String>,
}

impl ScriptedChecker {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            panic_on: None,
        }
    }

    /// Panics when asked to check `tx_hash`.
    pub fn panicking_on(mut self, tx_hash: &str) -> Self {
        self.panic_on = Some(tx_hash.to_string());
        self
    }

    pub fn script(&self, tx_hash: &str, results: Vec<CheckResult>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), results.into_iter().collect());
    }

    /// Outstanding sets passed for `tx_hash`, in call order.
    pub fn calls_for(&self, tx_hash: &str) -> Vec<StageSet> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(hash, _)| hash == tx_hash)
            .map(|(_, stages)| *stages)
            .collect()
    }
}

#[async_trait]
impl StageChecker for ScriptedChecker {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn check(&self, tx_hash: &str, _target_address: &str, outstanding: StageSet) -> CheckResult {
        if self.panic_on.as_deref() == Some(tx_hash) {
            panic!("scripted panic for {}", tx_hash);
        }
        self.calls.lock().unwrap().push((tx_hash.to_string(), outstanding));
        self.scripts
            .lock()
            .unwrap()
            .get_mut(tx_hash)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                CheckResult::pending(CheckCode::NotFound, "transaction not found", outstanding, TransferDetails::default())
            })
    }
}

/// Side-effect sinks that remember every call.
#[derive(Default)]
pub struct RecordingEffects {
    pub outcomes: Mutex<Vec<(String, Outcome)>>,
    pub notices: Mutex<Vec<(String, Notice)>>,
    pub advances: Mutex<Vec<(serde_json::Value, NextStep)>>,
    /// When set, `notify_requester` fails
    pub fail_notify: Mutex<bool>,
}

impl RecordingEffects {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn side_effects(self: &Arc<Self>) -> SideEffects {
        SideEffects {
            ledger: self.clone(),
            notifier: self.clone(),
            conversation: self.clone(),
        }
    }

    pub fn outcomes(&self) -> Vec<(String, Outcome)> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(String, Notice)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn advances(&self) -> Vec<(serde_json::Value, NextStep)> {
        self.advances.lock().unwrap().clone()
    }

    pub fn set_fail_notify(&self, fail: bool) {
        *self.fail_notify.lock().unwrap() = fail;
    }
}

#[async_trait]
impl OutcomeLedger for RecordingEffects {
    async fn record_outcome(&self, record: &TransactionRecord, outcome: &Outcome) -> Result<()> {
        self.outcomes
            .lock()
            .unwrap()
            .push((record.tx_hash.clone(), outcome.clone()));
        Ok(())
    }
}

#[async_trait]
impl RequesterNotifier for RecordingEffects {
    async fn notify_requester(&self, record: &TransactionRecord, notice: &Notice) -> Result<()> {
        if *self.fail_notify.lock().unwrap() {
            anyhow::bail!("chat transport unavailable");
        }
        self.notices
            .lock()
            .unwrap()
            .push((record.tx_hash.clone(), notice.clone()));
        Ok(())
    }
}

#[async_trait]
impl ConversationDriver for RecordingEffects {
    async fn advance_conversation(
        &self,
        conversation_ref: &serde_json::Value,
        next: NextStep,
        _record: &TransactionRecord,
        _details: &TransferDetails,
    ) -> Result<()> {
        self.advances.lock().unwrap().push((conversation_ref.clone(), next));
        Ok(())
    }
}
