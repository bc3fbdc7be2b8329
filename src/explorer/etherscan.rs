//! Etherscan Client Module
//!
//! Reads Ethereum transactions and blocks through Etherscan's `proxy` module,
//! which wraps the node JSON-RPC methods in a REST interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_quantity, ExplorerError, ExplorerHttp};
use crate::config::ChainConfig;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// Ethereum transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EthTransaction {
    /// Transaction hash
    pub hash: String,
    /// Block number (hex string), absent while the transaction is in the mempool
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    /// Sender address
    pub from: String,
    /// Recipient address or called contract, absent for contract creation
    #[serde(default)]
    pub to: Option<String>,
    /// Calldata
    #[serde(default)]
    pub input: String,
}

impl EthTransaction {
    /// Block number as an integer, if the transaction is mined.
    pub fn block(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_quantity)
    }
}

/// Block header fields used for transfer timestamps.
#[derive(Debug, Clone, Deserialize)]
struct EthBlock {
    timestamp: String,
}

// ============================================================================
// ETHERSCAN CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the Etherscan proxy API.
pub struct EtherscanClient {
    http: ExplorerHttp,
    api_key: Option<String>,
    chain_id: Option<u64>,
}

impl EtherscanClient {
    /// Creates a new Etherscan client from the ERC-20 chain settings.
    ///
    /// # Arguments
    ///
    /// * `config` - Explorer URL, limits and API key variable
    ///
    /// # Returns
    ///
    /// * `Ok(EtherscanClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create the HTTP client
    pub fn new(config: &ChainConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: ExplorerHttp::new(config)?,
            api_key: config.api_key(),
            chain_id: config.chain_id,
        })
    }

    /// Fetches a transaction by hash.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(tx))` - Transaction known to the explorer
    /// * `Ok(None)` - Unknown hash
    /// * `Err(ExplorerError)` - Transport or API failure after retries
    pub async fn get_transaction(&self, tx_hash: &str) -> Result<Option<EthTransaction>, ExplorerError> {
        let result = self
            .proxy_call("eth_getTransactionByHash", vec![("txhash", tx_hash.to_string())])
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ExplorerError::Malformed(format!("transaction {}: {}", tx_hash, e)))
    }

    /// Fetches the timestamp (unix seconds) of a block.
    ///
    /// # Arguments
    ///
    /// * `block_number` - Block number
    ///
    /// # Returns
    ///
    /// * `Ok(Some(secs))` - Block timestamp
    /// * `Ok(None)` - Block unknown to the explorer
    pub async fn get_block_timestamp(&self, block_number: u64) -> Result<Option<u64>, ExplorerError> {
        let result = self
            .proxy_call(
                "eth_getBlockByNumber",
                vec![
                    ("tag", format!("0x{:x}", block_number)),
                    ("boolean", "false".to_string()),
                ],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let block: EthBlock = serde_json::from_value(result)
            .map_err(|e| ExplorerError::Malformed(format!("block {}: {}", block_number, e)))?;
        parse_quantity(&block.timestamp)
            .map(Some)
            .ok_or_else(|| ExplorerError::Malformed(format!("block timestamp '{}'", block.timestamp)))
    }

    /// Fetches the current chain head block number.
    pub async fn get_block_number(&self) -> Result<u64, ExplorerError> {
        let result = self.proxy_call("eth_blockNumber", Vec::new()).await?;
        result
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| ExplorerError::Malformed(format!("block number {}", result)))
    }

    async fn proxy_call(&self, action: &str, params: Vec<(&str, String)>) -> Result<Value, ExplorerError> {
        let mut query: Vec<(&str, String)> = vec![("module", "proxy".to_string()), ("action", action.to_string())];
        query.extend(params);
        if let Some(chain_id) = self.chain_id {
            query.push(("chainid", chain_id.to_string()));
        }
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }
        self.http.get_json("", &query, &[], interpret_proxy_response).await
    }
}

/// Unwraps a proxy-module response into its `result` value.
///
/// Etherscan reports account-level failures as `{"status":"0","message":"NOTOK","result":"<text>"}`
/// and node failures as a JSON-RPC `error` object. Rate limit texts map to
/// `RateLimited` so the request is retried.
fn interpret_proxy_response(body: Value) -> Result<Value, ExplorerError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ExplorerError::Api(message));
    }

    if body.get("status").and_then(Value::as_str) == Some("0") {
        let detail = body
            .get("result")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .unwrap_or("NOTOK")
            .to_string();
        if detail.to_ascii_lowercase().contains("rate limit") {
            return Err(ExplorerError::RateLimited(detail));
        }
        return Err(ExplorerError::Api(detail));
    }

    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}
