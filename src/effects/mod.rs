//! Side effects of a finished check
//!
//! The verifier does not own the ledger, the chat transport or the
//! conversation flow. It reaches them through these traits; the defaults
//! here only log, and deployments plug in real implementations.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::messages;
use crate::storage::TransactionRecord;
use crate::validator::{CheckCode, TransferDetails};

// ============================================================================
// OUTCOMES AND NOTICES
// ============================================================================

/// Terminal result for a tracked transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// All stages passed
    Confirmed { details: TransferDetails },
    /// A check proved the transfer can never satisfy the request
    Rejected { code: CheckCode, error: String },
    /// No confirmation arrived within the pending window
    Expired {
        last_code: Option<CheckCode>,
        last_error: Option<String>,
        #[serde(skip)]
        window: Duration,
    },
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Confirmed { .. } => "confirmed",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Expired { .. } => "expired",
        }
    }

    pub fn code(&self) -> Option<CheckCode> {
        match self {
            Outcome::Confirmed { .. } => None,
            Outcome::Rejected { code, .. } => Some(*code),
            Outcome::Expired { .. } => Some(CheckCode::Expired),
        }
    }
}

/// Message sent to the requester.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The transaction is being tracked and will be reported on later
    InProgress,
    /// The transaction reached a terminal outcome
    Final(Outcome),
}

/// Conversation step to move the requester to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Ask the requester for their contact details to complete the exchange
    EnterContact,
}

// ============================================================================
// SIDE-EFFECT INTERFACES
// ============================================================================

/// Durable log of terminal outcomes.
#[async_trait]
pub trait OutcomeLedger: Send + Sync {
    async fn record_outcome(&self, record: &TransactionRecord, outcome: &Outcome) -> Result<()>;
}

/// Delivers notices to the requester.
#[async_trait]
pub trait RequesterNotifier: Send + Sync {
    async fn notify_requester(&self, record: &TransactionRecord, notice: &Notice) -> Result<()>;
}

/// Moves the requester's conversation forward after a confirmation.
#[async_trait]
pub trait ConversationDriver: Send + Sync {
    async fn advance_conversation(
        &self,
        conversation_ref: &serde_json::Value,
        next: NextStep,
        record: &TransactionRecord,
        details: &TransferDetails,
    ) -> Result<()>;
}

/// The three side-effect sinks, shared by the poller and the immediate check.
#[derive(Clone)]
pub struct SideEffects {
    pub ledger: Arc<dyn OutcomeLedger>,
    pub notifier: Arc<dyn RequesterNotifier>,
    pub conversation: Arc<dyn ConversationDriver>,
}

impl SideEffects {
    /// Side effects that only write to the log.
    pub fn tracing() -> Self {
        Self {
            ledger: Arc::new(TracingLedger),
            notifier: Arc::new(TracingNotifier),
            conversation: Arc::new(TracingConversation),
        }
    }
}

// ============================================================================
// LOG-ONLY IMPLEMENTATIONS
// ============================================================================

pub struct TracingLedger;

#[async_trait]
impl OutcomeLedger for TracingLedger {
    async fn record_outcome(&self, record: &TransactionRecord, outcome: &Outcome) -> Result<()> {
        let amount = match outcome {
            Outcome::Confirmed { details } => details.amount.map(|a| a.to_string()),
            _ => None,
        };
        info!(
            chain = %record.chain,
            tx_hash = %record.tx_hash,
            requester_id = %record.requester_id,
            status = outcome.status(),
            code = outcome.code().map(|c| c.as_str()).unwrap_or("ok"),
            amount = amount.as_deref().unwrap_or("-"),
            "Transfer outcome recorded"
        );
        Ok(())
    }
}

pub struct TracingNotifier;

#[async_trait]
impl RequesterNotifier for TracingNotifier {
    async fn notify_requester(&self, record: &TransactionRecord, notice: &Notice) -> Result<()> {
        let text = messages::render(notice, record.chain, &record.locale);
        info!(
            requester_id = %record.requester_id,
            conversation_ref = %record.conversation_ref,
            "Notify requester: {}",
            text
        );
        Ok(())
    }
}

pub struct TracingConversation;

#[async_trait]
impl ConversationDriver for TracingConversation {
    async fn advance_conversation(
        &self,
        conversation_ref: &serde_json::Value,
        next: NextStep,
        record: &TransactionRecord,
        _details: &TransferDetails,
    ) -> Result<()> {
        info!(
            conversation_ref = %conversation_ref,
            tx_hash = %record.tx_hash,
            "Advancing conversation to {:?}",
            next
        );
        Ok(())
    }
}
