//! Terminal outcome handling
//!
//! Applies the side effects of a confirmed, rejected or expired transaction
//! and removes its pending record. The record is only removed after every
//! side effect succeeded, so a failed delivery is retried on the next sweep.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::effects::{NextStep, Notice, Outcome, SideEffects};
use crate::storage::{PendingStore, TransactionRecord};

/// Runs the side effects of terminal outcomes.
#[derive(Clone)]
pub struct OutcomeHandler {
    store: Arc<dyn PendingStore>,
    effects: SideEffects,
}

impl OutcomeHandler {
    pub fn new(store: Arc<dyn PendingStore>, effects: SideEffects) -> Self {
        Self { store, effects }
    }

    /// Records, notifies, advances the conversation (confirmations only) and deletes.
    ///
    /// # Arguments
    ///
    /// * `record` - The tracked transaction, stored or not
    /// * `outcome` - Terminal outcome to apply
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All side effects applied and the record removed
    /// * `Err(anyhow::Error)` - A side effect failed; the record is left in place
    pub async fn finalize(&self, record: &TransactionRecord, outcome: Outcome) -> Result<()> {
        self.effects
            .ledger
            .record_outcome(record, &outcome)
            .await
            .context("Failed to record outcome")?;

        let status = outcome.status();
        let notice = Notice::Final(outcome);
        self.effects
            .notifier
            .notify_requester(record, &notice)
            .await
            .context("Failed to notify requester")?;

        if let Notice::Final(Outcome::Confirmed { details }) = &notice {
            self.effects
                .conversation
                .advance_conversation(&record.conversation_ref, NextStep::EnterContact, record, details)
                .await
                .context("Failed to advance conversation")?;
        }

        let removed = self
            .store
            .delete(record.chain, &record.tx_hash)
            .await
            .context("Failed to delete pending record")?;

        info!(
            "Transaction {} on {} finished as {} (record removed: {})",
            record.tx_hash, record.chain, status, removed
        );
        Ok(())
    }

    /// Tells the requester their transaction is being tracked.
    ///
    /// Failures are logged only; the record is already stored and the final
    /// notice still goes out.
    pub async fn notify_in_progress(&self, record: &TransactionRecord) {
        if let Err(e) = self
            .effects
            .notifier
            .notify_requester(record, &Notice::InProgress)
            .await
        {
            warn!("Failed to send in-progress notice for {}: {}", record.tx_hash, e);
        }
    }
}
