//! Immediate check on submission
//!
//! When a requester submits a hash, the transaction is checked right away.
//! Terminal results are finalized on the spot; anything else becomes a
//! pending record for the poller.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::outcome::OutcomeHandler;
use crate::effects::Outcome;
use crate::storage::{PendingStore, TransactionRecord};
use crate::validator::{Chain, CheckCode, CheckResult, CheckerSet, StageSet, TransferDetails};

/// A submitted transaction to verify.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub chain: Chain,
    /// Normalized transaction hash
    pub tx_hash: String,
    pub target_address: String,
    pub requester_id: String,
    pub conversation_ref: serde_json::Value,
    pub locale: String,
    pub claimed_amount: Option<String>,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitStatus {
    Confirmed {
        details: TransferDetails,
    },
    Rejected {
        code: CheckCode,
        error: String,
    },
    /// Stored for the poller
    Pending {
        code: CheckCode,
        error: String,
        remaining: StageSet,
        details: TransferDetails,
    },
    /// The hash is already being tracked; nothing was checked
    AlreadyTracked {
        record: TransactionRecord,
    },
    /// Another check of the same hash is running right now
    Busy,
}

/// Runs the first check of a newly submitted transaction.
#[derive(Clone)]
pub struct ImmediateChecker {
    store: Arc<dyn PendingStore>,
    checkers: CheckerSet,
    outcomes: OutcomeHandler,
    lock_ttl: Duration,
}

impl ImmediateChecker {
    pub fn new(store: Arc<dyn PendingStore>, checkers: CheckerSet, outcomes: OutcomeHandler, lock_ttl: Duration) -> Self {
        Self {
            store,
            checkers,
            outcomes,
            lock_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn PendingStore> {
        &self.store
    }

    /// Whether submissions for `chain` can be checked.
    pub fn supports(&self, chain: Chain) -> bool {
        self.checkers.get(chain).is_some()
    }

    /// Checks a submitted transaction with all stages outstanding.
    ///
    /// # Arguments
    ///
    /// * `request` - Submission with a normalized hash
    ///
    /// # Returns
    ///
    /// * `Ok(SubmitStatus)` - Result of the check or why it was not run
    /// * `Err(anyhow::Error)` - Chain not enabled or a store failure
    pub async fn submit(&self, request: CheckRequest) -> Result<SubmitStatus> {
        if self.checkers.get(request.chain).is_none() {
            return Err(anyhow!("chain {} is not enabled", request.chain));
        }

        let Some(token) = self
            .store
            .try_lock(request.chain, &request.tx_hash, self.lock_ttl)
            .await?
        else {
            return Ok(SubmitStatus::Busy);
        };

        let result = self.submit_locked(request.clone()).await;

        if let Err(e) = self.store.unlock(request.chain, &request.tx_hash, &token).await {
            warn!("Failed to release lock on {}: {}", request.tx_hash, e);
        }
        result
    }

    async fn submit_locked(&self, request: CheckRequest) -> Result<SubmitStatus> {
        if let Some(record) = self.store.get(request.chain, &request.tx_hash).await? {
            info!("Transaction {} is already tracked", request.tx_hash);
            return Ok(SubmitStatus::AlreadyTracked { record });
        }

        let checker = self
            .checkers
            .get(request.chain)
            .ok_or_else(|| anyhow!("chain {} is not enabled", request.chain))?;

        let mut record = TransactionRecord {
            tx_hash: request.tx_hash,
            chain: request.chain,
            target_address: request.target_address,
            requester_id: request.requester_id,
            conversation_ref: request.conversation_ref,
            locale: request.locale,
            claimed_amount: request.claimed_amount,
            outstanding_stages: checker.initial_stages(),
            last_error_code: None,
            last_error_text: None,
            details: TransferDetails::default(),
            first_seen: Utc::now(),
        };

        let result = checker
            .check(&record.tx_hash, &record.target_address, record.outstanding_stages)
            .await;
        info!(
            "Immediate check of {} {}: {} {:?}",
            record.chain,
            record.tx_hash,
            result.status(),
            result.code()
        );

        match result {
            CheckResult::Confirmed(details) => {
                let outcome = Outcome::Confirmed { details: details.clone() };
                if let Err(e) = self.outcomes.finalize(&record, outcome).await {
                    record.details = details;
                    return self.keep_for_retry(record, StageSet::empty(), e).await;
                }
                Ok(SubmitStatus::Confirmed { details })
            }
            CheckResult::Failed { code, error, remaining } => {
                let outcome = Outcome::Rejected { code, error: error.clone() };
                if let Err(e) = self.outcomes.finalize(&record, outcome).await {
                    let remaining = record.outstanding_stages.intersection(remaining);
                    return self.keep_for_retry(record, remaining, e).await;
                }
                Ok(SubmitStatus::Rejected { code, error })
            }
            CheckResult::Pending {
                code,
                error,
                remaining,
                details,
            } => {
                record.outstanding_stages = record.outstanding_stages.intersection(remaining);
                record.last_error_code = Some(code);
                record.last_error_text = Some(error.clone());
                record.details = details.clone();

                if !self.store.create(&record).await? {
                    let existing = self.store.get(record.chain, &record.tx_hash).await?;
                    if let Some(existing) = existing {
                        return Ok(SubmitStatus::AlreadyTracked { record: existing });
                    }
                }
                self.outcomes.notify_in_progress(&record).await;
                Ok(SubmitStatus::Pending {
                    code,
                    error,
                    remaining: record.outstanding_stages,
                    details,
                })
            }
        }
    }

    /// Stores a terminal result whose side effects failed so the poller
    /// finishes them on its next sweep.
    async fn keep_for_retry(
        &self,
        mut record: TransactionRecord,
        remaining: StageSet,
        cause: anyhow::Error,
    ) -> Result<SubmitStatus> {
        warn!(
            "Side effects for {} {} failed, keeping the record for the poller: {:#}",
            record.chain, record.tx_hash, cause
        );
        let error = format!("{:#}", cause);
        record.outstanding_stages = remaining;
        record.last_error_code = Some(CheckCode::InternalError);
        record.last_error_text = Some(error.clone());

        if !self.store.create(&record).await? {
            if let Some(existing) = self.store.get(record.chain, &record.tx_hash).await? {
                return Ok(SubmitStatus::AlreadyTracked { record: existing });
            }
        }
        Ok(SubmitStatus::Pending {
            code: CheckCode::InternalError,
            error,
            remaining,
            details: record.details,
        })
    }
}
