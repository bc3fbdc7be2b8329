//! ERC-20 stage checker
//!
//! Walks the stages in order for an Ethereum transaction read through
//! Etherscan. Stages already satisfied by an earlier check are skipped.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::generic::{Chain, CheckCode, CheckResult, Stage, StageChecker, StageSet, TransferDetails};
use crate::config::ChainConfig;
use crate::explorer::EtherscanClient;
use crate::transfer_decoder::{decode_transfer_input, TokenAmount};

/// Confirmations accrued by a transaction mined in `block`, seen from `head`.
pub fn confirmations_between(head: u64, block: u64) -> u64 {
    head.saturating_sub(block)
}

/// Stage checker for ERC-20 transfers.
pub struct Erc20StageChecker {
    client: Arc<EtherscanClient>,
    /// Expected token contract, lowercase
    token_contract: String,
    token_decimals: u8,
    required_confirmations: u64,
}

impl Erc20StageChecker {
    pub fn new(client: Arc<EtherscanClient>, config: &ChainConfig) -> Self {
        Self {
            client,
            token_contract: config.token_contract.to_ascii_lowercase(),
            token_decimals: config.token_decimals,
            required_confirmations: config.required_confirmations,
        }
    }
}

#[async_trait]
impl StageChecker for Erc20StageChecker {
    fn chain(&self) -> Chain {
        Chain::Erc20
    }

    async fn check(&self, tx_hash: &str, target_address: &str, outstanding: StageSet) -> CheckResult {
        let mut remaining = outstanding;
        let mut details = TransferDetails::default();

        let tx = match self.client.get_transaction(tx_hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                return CheckResult::pending(CheckCode::NotFound, "transaction not found", remaining, details)
            }
            Err(e) => {
                warn!("Etherscan lookup of {} failed: {}", tx_hash, e);
                return CheckResult::pending(CheckCode::ApiError, e.to_string(), remaining, details);
            }
        };
        details.counterparty = Some(tx.from.to_ascii_lowercase());
        let block = tx.block();

        if remaining.contains(Stage::InBlock) {
            if block.is_none() {
                return CheckResult::pending(
                    CheckCode::NotInBlock,
                    "transaction is not included in a block yet",
                    remaining,
                    details,
                );
            }
            remaining.remove(Stage::InBlock);
        }

        if remaining.contains(Stage::ExpectedToken) {
            let to = tx.to.as_deref().unwrap_or_default().to_ascii_lowercase();
            if to != self.token_contract {
                return CheckResult::failed(
                    CheckCode::InvalidToken,
                    format!("transaction calls {} instead of the token contract", to),
                    remaining,
                );
            }
            remaining.remove(Stage::ExpectedToken);
        }

        if remaining.contains(Stage::Recipient) {
            let decoded = match decode_transfer_input(&tx.input) {
                Ok(decoded) => decoded,
                Err(e) => {
                    return CheckResult::pending(CheckCode::DecodeError, e.to_string(), remaining, details)
                }
            };
            if decoded.recipient != target_address.to_ascii_lowercase() {
                return CheckResult::failed(
                    CheckCode::InvalidRecipient,
                    format!("tokens were sent to {}", decoded.recipient),
                    remaining,
                );
            }
            remaining.remove(Stage::Recipient);
        }

        if remaining.contains(Stage::TransferParams) {
            let amount = match decode_transfer_input(&tx.input)
                .and_then(|decoded| TokenAmount::new(decoded.raw_amount, self.token_decimals))
            {
                Ok(amount) => amount,
                Err(e) => {
                    return CheckResult::pending(CheckCode::DecodeError, e.to_string(), remaining, details)
                }
            };
            let Some(block_number) = block else {
                return CheckResult::pending(
                    CheckCode::NotInBlock,
                    "transaction is not included in a block yet",
                    remaining,
                    details,
                );
            };
            let timestamp = match self.client.get_block_timestamp(block_number).await {
                Ok(Some(secs)) => Utc.timestamp_opt(secs as i64, 0).single(),
                Ok(None) => None,
                Err(e) => {
                    warn!("Etherscan block {} lookup failed: {}", block_number, e);
                    return CheckResult::pending(CheckCode::ApiError, e.to_string(), remaining, details);
                }
            };
            let Some(timestamp) = timestamp else {
                return CheckResult::pending(
                    CheckCode::ApiError,
                    format!("timestamp of block {} is unavailable", block_number),
                    remaining,
                    details,
                );
            };
            details.amount = Some(amount);
            details.timestamp = Some(timestamp);
            remaining.remove(Stage::TransferParams);
        }

        if remaining.contains(Stage::Confirmations) {
            let Some(block_number) = block else {
                return CheckResult::pending(
                    CheckCode::NotInBlock,
                    "transaction is not included in a block yet",
                    remaining,
                    details,
                );
            };
            let head = match self.client.get_block_number().await {
                Ok(head) => head,
                Err(e) => {
                    warn!("Etherscan head lookup failed: {}", e);
                    return CheckResult::pending(CheckCode::ApiError, e.to_string(), remaining, details);
                }
            };
            let confirmations = confirmations_between(head, block_number);
            details.confirmations = Some(confirmations);
            if confirmations < self.required_confirmations {
                return CheckResult::pending(
                    CheckCode::LowConfirmations,
                    format!(
                        "not enough confirmations: {}/{}",
                        confirmations, self.required_confirmations
                    ),
                    remaining,
                    details,
                );
            }
            remaining.remove(Stage::Confirmations);
        }

        debug!("ERC-20 transaction {} passed all stages", tx_hash);
        CheckResult::Confirmed(details)
    }
}
