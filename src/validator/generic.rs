//! Generic validator structures shared by all chains
//!
//! This module contains the chain identifiers, the verification stage set,
//! result codes and the `StageChecker` trait implemented per chain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::transfer_decoder::TokenAmount;

// ============================================================================
// CHAINS
// ============================================================================

/// Token network a transfer is verified on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    /// ERC-20 token on Ethereum
    Erc20,
    /// TRC-20 token on Tron
    Trc20,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Erc20, Chain::Trc20];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Erc20 => "erc20",
            Chain::Trc20 => "trc20",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "erc20" => Ok(Chain::Erc20),
            "trc20" => Ok(Chain::Trc20),
            other => Err(anyhow::anyhow!("unknown chain '{}'", other)),
        }
    }
}

// ============================================================================
// STAGES
// ============================================================================

/// One verification stage of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Transaction is included in a block
    InBlock,
    /// Transaction moves the expected token contract
    ExpectedToken,
    /// Tokens went to the expected recipient
    Recipient,
    /// Amount, sender and time were extracted
    TransferParams,
    /// Enough confirmations have accrued
    Confirmations,
}

impl Stage {
    /// All stages in ERC-20 evaluation order.
    pub const ORDERED: [Stage; 5] = [
        Stage::InBlock,
        Stage::ExpectedToken,
        Stage::Recipient,
        Stage::TransferParams,
        Stage::Confirmations,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of stages that still need to pass.
///
/// Stored per pending record. Once a stage leaves the set it never comes back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Stage>", into = "Vec<Stage>")]
pub struct StageSet(u8);

impl StageSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Stage::ORDERED.into_iter().collect()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0 |= stage.bit();
    }

    pub fn remove(&mut self, stage: Stage) {
        self.0 &= !stage.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Stages present in both sets.
    pub fn intersection(&self, other: StageSet) -> StageSet {
        Self(self.0 & other.0)
    }

    pub fn is_subset(&self, other: StageSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Iterates stages in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ORDERED.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        let mut set = StageSet::empty();
        for stage in iter {
            set.insert(stage);
        }
        set
    }
}

impl From<Vec<Stage>> for StageSet {
    fn from(stages: Vec<Stage>) -> Self {
        stages.into_iter().collect()
    }
}

impl From<StageSet> for Vec<Stage> {
    fn from(set: StageSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ============================================================================
// RESULT CODES
// ============================================================================

/// Reason code attached to pending, rejected and expired results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCode {
    NotFound,
    NotInBlock,
    NotConfirmed,
    InvalidToken,
    InvalidRecipient,
    ContractError,
    NoTransfers,
    LowConfirmations,
    DecodeError,
    ApiError,
    InternalError,
    Expired,
}

impl CheckCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCode::NotFound => "not_found",
            CheckCode::NotInBlock => "not_in_block",
            CheckCode::NotConfirmed => "not_confirmed",
            CheckCode::InvalidToken => "invalid_token",
            CheckCode::InvalidRecipient => "invalid_recipient",
            CheckCode::ContractError => "contract_error",
            CheckCode::NoTransfers => "no_transfers",
            CheckCode::LowConfirmations => "low_confirmations",
            CheckCode::DecodeError => "decode_error",
            CheckCode::ApiError => "api_error",
            CheckCode::InternalError => "internal_error",
            CheckCode::Expired => "expired",
        }
    }

    /// Codes that can never turn into a confirmation on a later check.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CheckCode::InvalidToken
                | CheckCode::InvalidRecipient
                | CheckCode::ContractError
                | CheckCode::NoTransfers
        )
    }
}

impl fmt::Display for CheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHECK RESULTS
// ============================================================================

/// Transfer facts gathered while checking.
///
/// Fields fill in as stages pass; a partially checked transfer carries
/// only what has been learned so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferDetails {
    /// Transferred amount
    pub amount: Option<TokenAmount>,
    /// Sender address
    pub counterparty: Option<String>,
    /// Block time of the transfer
    pub timestamp: Option<DateTime<Utc>>,
    /// Confirmations observed at check time
    pub confirmations: Option<u64>,
}

impl TransferDetails {
    /// Overlays the fields known in `newer` on top of `self`.
    pub fn merge(mut self, newer: TransferDetails) -> TransferDetails {
        if newer.amount.is_some() {
            self.amount = newer.amount;
        }
        if newer.counterparty.is_some() {
            self.counterparty = newer.counterparty;
        }
        if newer.timestamp.is_some() {
            self.timestamp = newer.timestamp;
        }
        if newer.confirmations.is_some() {
            self.confirmations = newer.confirmations;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &TransferDetails::default()
    }
}

/// Outcome of one check of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Every stage passed
    Confirmed(TransferDetails),
    /// Some stages could not pass yet; `remaining` is what the next check must verify
    Pending {
        code: CheckCode,
        error: String,
        remaining: StageSet,
        details: TransferDetails,
    },
    /// The transaction can never satisfy the request
    Failed {
        code: CheckCode,
        error: String,
        remaining: StageSet,
    },
}

impl CheckResult {
    pub fn pending(code: CheckCode, error: impl Into<String>, remaining: StageSet, details: TransferDetails) -> Self {
        CheckResult::Pending {
            code,
            error: error.into(),
            remaining,
            details,
        }
    }

    pub fn failed(code: CheckCode, error: impl Into<String>, remaining: StageSet) -> Self {
        CheckResult::Failed {
            code,
            error: error.into(),
            remaining,
        }
    }

    /// Status label used in logs and API responses.
    pub fn status(&self) -> &'static str {
        match self {
            CheckResult::Confirmed(_) => "confirmed",
            CheckResult::Pending { .. } => "pending",
            CheckResult::Failed { .. } => "failed",
        }
    }

    pub fn code(&self) -> Option<CheckCode> {
        match self {
            CheckResult::Confirmed(_) => None,
            CheckResult::Pending { code, .. } | CheckResult::Failed { code, .. } => Some(*code),
        }
    }

    pub fn remaining(&self) -> StageSet {
        match self {
            CheckResult::Confirmed(_) => StageSet::empty(),
            CheckResult::Pending { remaining, .. } | CheckResult::Failed { remaining, .. } => *remaining,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckResult::Pending { .. })
    }
}

// ============================================================================
// STAGE CHECKER
// ============================================================================

/// Verifies a transaction against a target recipient, one chain at a time.
///
/// Implementations only evaluate stages in `outstanding` and never report a
/// stage as remaining once it has passed. Transport problems surface as
/// `Pending` with code `api_error`; they never escape as errors.
#[async_trait]
pub trait StageChecker: Send + Sync {
    /// Chain this checker serves.
    fn chain(&self) -> Chain;

    /// Stages a new record starts with.
    fn initial_stages(&self) -> StageSet {
        StageSet::all()
    }

    /// Checks `tx_hash` against `target_address`, evaluating only `outstanding`.
    async fn check(&self, tx_hash: &str, target_address: &str, outstanding: StageSet) -> CheckResult;
}
