//! Tronscan Client Module
//!
//! Reads TRC-20 transaction info from the Tronscan `transaction-info` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExplorerError, ExplorerHttp};
use crate::config::ChainConfig;

/// Header carrying the Tronscan API key.
pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// Subset of Tronscan's transaction-info response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TronTransactionInfo {
    #[serde(default)]
    pub hash: Option<String>,
    /// Whether the block holding the transaction is solidified
    #[serde(default)]
    pub confirmed: bool,
    /// Blocks built on top of the transaction's block
    #[serde(default)]
    pub confirmations: u64,
    /// Contract execution result, "SUCCESS" when the call succeeded
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
    /// Block time in milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "ownerAddress", default)]
    pub owner_address: Option<String>,
    /// TRC-20 transfers emitted by the transaction
    #[serde(rename = "trc20TransferInfo", default)]
    pub trc20_transfer_info: Vec<Trc20TransferInfo>,
}

/// One TRC-20 transfer inside a transaction.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Trc20TransferInfo {
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub to_address: String,
    /// Raw amount in smallest units, as a decimal string
    #[serde(default)]
    pub amount_str: String,
    #[serde(default)]
    pub decimals: Option<u8>,
}

// ============================================================================
// TRONSCAN CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the Tronscan API.
pub struct TronscanClient {
    http: ExplorerHttp,
    api_key: Option<String>,
}

impl TronscanClient {
    /// Creates a new Tronscan client from the TRC-20 chain settings.
    ///
    /// # Arguments
    ///
    /// * `config` - Explorer URL, limits and API key variable
    pub fn new(config: &ChainConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: ExplorerHttp::new(config)?,
            api_key: config.api_key(),
        })
    }

    /// Fetches transaction info by hash.
    ///
    /// Tronscan answers an unknown hash with an empty object, reported here as `Ok(None)`.
    pub async fn get_transaction_info(&self, tx_hash: &str) -> Result<Option<TronTransactionInfo>, ExplorerError> {
        let headers: Vec<(&'static str, String)> = self
            .api_key
            .iter()
            .map(|key| (API_KEY_HEADER, key.clone()))
            .collect();
        let query = [("hash", tx_hash.to_string())];

        self.http
            .get_json("transaction-info", &query, &headers, |body| interpret_info(tx_hash, body))
            .await
    }
}

fn interpret_info(tx_hash: &str, body: Value) -> Result<Option<TronTransactionInfo>, ExplorerError> {
    let Some(object) = body.as_object() else {
        return Err(ExplorerError::Malformed(format!("transaction-info for {} is not an object", tx_hash)));
    };
    if object.is_empty() || (!object.contains_key("hash") && !object.contains_key("contractRet")) {
        return Ok(None);
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| ExplorerError::Malformed(format!("transaction-info for {}: {}", tx_hash, e)))
}
