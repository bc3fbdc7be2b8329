//! TRC-20 stage checker
//!
//! Tronscan returns everything in one response, so the checker performs a
//! single lookup and evaluates the outstanding stages against it.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::generic::{Chain, CheckCode, CheckResult, Stage, StageChecker, StageSet, TransferDetails};
use crate::config::ChainConfig;
use crate::explorer::{TronTransactionInfo, TronscanClient, Trc20TransferInfo};
use crate::transfer_decoder::TokenAmount;

/// Contract result Tronscan reports for a successful call.
const CONTRACT_SUCCESS: &str = "SUCCESS";

/// Stage checker for TRC-20 transfers.
pub struct Trc20StageChecker {
    client: Arc<TronscanClient>,
    /// Expected token contract (base58, case-sensitive)
    token_contract: String,
    token_decimals: u8,
    required_confirmations: u64,
}

impl Trc20StageChecker {
    pub fn new(client: Arc<TronscanClient>, config: &ChainConfig) -> Self {
        Self {
            client,
            token_contract: config.token_contract.clone(),
            token_decimals: config.token_decimals,
            required_confirmations: config.required_confirmations,
        }
    }

    /// Picks the transfer of the expected token, falling back to the first one.
    fn select_transfer<'a>(&self, info: &'a TronTransactionInfo) -> Option<&'a Trc20TransferInfo> {
        info.trc20_transfer_info
            .iter()
            .find(|t| t.contract_address == self.token_contract)
            .or_else(|| info.trc20_transfer_info.first())
    }
}

#[async_trait]
impl StageChecker for Trc20StageChecker {
    fn chain(&self) -> Chain {
        Chain::Trc20
    }

    async fn check(&self, tx_hash: &str, target_address: &str, outstanding: StageSet) -> CheckResult {
        let mut remaining = outstanding;
        let mut details = TransferDetails::default();

        let info = match self.client.get_transaction_info(tx_hash).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                return CheckResult::pending(CheckCode::NotFound, "transaction not found", remaining, details)
            }
            Err(e) => {
                warn!("Tronscan lookup of {} failed: {}", tx_hash, e);
                return CheckResult::pending(CheckCode::ApiError, e.to_string(), remaining, details);
            }
        };

        let transfer = self.select_transfer(&info);
        details.confirmations = Some(info.confirmations);
        details.timestamp = info
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        details.counterparty = transfer
            .map(|t| t.from_address.clone())
            .filter(|from| !from.is_empty())
            .or_else(|| info.owner_address.clone());

        if remaining.contains(Stage::InBlock) {
            if !info.confirmed {
                return CheckResult::pending(
                    CheckCode::NotConfirmed,
                    "transaction is not confirmed yet",
                    remaining,
                    details,
                );
            }
            remaining.remove(Stage::InBlock);
        }

        if remaining.contains(Stage::Confirmations) {
            if info.confirmations < self.required_confirmations {
                return CheckResult::pending(
                    CheckCode::LowConfirmations,
                    format!(
                        "not enough confirmations: {}/{}",
                        info.confirmations, self.required_confirmations
                    ),
                    remaining,
                    details,
                );
            }
            remaining.remove(Stage::Confirmations);
        }

        if remaining.contains(Stage::ExpectedToken) {
            let contract_ret = info.contract_ret.as_deref().unwrap_or_default();
            if contract_ret != CONTRACT_SUCCESS {
                return CheckResult::failed(
                    CheckCode::ContractError,
                    format!("contract execution failed: {}", contract_ret),
                    remaining,
                );
            }
            let Some(transfer) = transfer else {
                return CheckResult::failed(
                    CheckCode::NoTransfers,
                    "transaction contains no TRC-20 transfers",
                    remaining,
                );
            };
            if transfer.contract_address != self.token_contract {
                return CheckResult::failed(
                    CheckCode::InvalidToken,
                    format!("transfer of token {} instead of the expected token", transfer.contract_address),
                    remaining,
                );
            }
            remaining.remove(Stage::ExpectedToken);
        }

        if remaining.contains(Stage::Recipient) {
            let Some(transfer) = transfer else {
                return CheckResult::failed(
                    CheckCode::NoTransfers,
                    "transaction contains no TRC-20 transfers",
                    remaining,
                );
            };
            if transfer.to_address != target_address {
                return CheckResult::failed(
                    CheckCode::InvalidRecipient,
                    format!("tokens were sent to {}", transfer.to_address),
                    remaining,
                );
            }
            remaining.remove(Stage::Recipient);
        }

        if remaining.contains(Stage::TransferParams) {
            let parsed = transfer
                .ok_or_else(|| "transaction contains no TRC-20 transfers".to_string())
                .and_then(|t| {
                    TokenAmount::from_decimal_str(&t.amount_str, t.decimals.unwrap_or(self.token_decimals))
                        .map_err(|e| e.to_string())
                });
            match parsed {
                Ok(amount) => details.amount = Some(amount),
                Err(e) => return CheckResult::pending(CheckCode::DecodeError, e, remaining, details),
            }
            remaining.remove(Stage::TransferParams);
        }

        debug!("TRC-20 transaction {} passed all stages", tx_hash);
        CheckResult::Confirmed(details)
    }
}
