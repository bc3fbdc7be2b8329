//! Pending transaction records and the store interface
//!
//! A record tracks one submitted transaction until it is confirmed, rejected
//! or expires. Records are keyed by chain and normalized hash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::validator::{Chain, CheckCode, StageSet, TransferDetails};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Persisted state of a transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Normalized (lowercase) transaction hash
    pub tx_hash: String,
    pub chain: Chain,
    /// Address the tokens must reach
    pub target_address: String,
    /// Opaque id of the user who submitted the hash
    pub requester_id: String,
    /// Opaque handle used to resume the requester's conversation
    pub conversation_ref: serde_json::Value,
    /// Language for notifications ("en", "ru", "ua")
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Amount the requester said they sent, informational only
    #[serde(default)]
    pub claimed_amount: Option<String>,
    /// Stages that still need to pass; only ever shrinks
    pub outstanding_stages: StageSet,
    #[serde(default)]
    pub last_error_code: Option<CheckCode>,
    #[serde(default)]
    pub last_error_text: Option<String>,
    /// Transfer facts learned by earlier checks
    #[serde(default)]
    pub details: TransferDetails,
    /// When the record was first created; never changes
    pub first_seen: DateTime<Utc>,
}

fn default_locale() -> String {
    "en".to_string()
}

impl TransactionRecord {
    /// Whether the record has been pending for longer than `max_pending`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_pending: Duration) -> bool {
        let max_pending = chrono::Duration::from_std(max_pending).unwrap_or_else(|_| chrono::Duration::max_value());
        now.signed_duration_since(self.first_seen) > max_pending
    }
}

/// Opaque token proving ownership of a record lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// KEY SCHEMA
// ============================================================================

/// Key of a pending record: `{prefix}:{chain}:{tx_hash}`.
pub fn record_key(prefix: &str, chain: Chain, tx_hash: &str) -> String {
    format!("{}:{}:{}", prefix, chain, tx_hash)
}

/// Key of a record's check lock: `{prefix}:lock:{chain}:{tx_hash}`.
pub fn lock_key(prefix: &str, chain: Chain, tx_hash: &str) -> String {
    format!("{}:lock:{}:{}", prefix, chain, tx_hash)
}

/// Glob matching every record of `chain` and no lock keys.
pub fn chain_pattern(prefix: &str, chain: Chain) -> String {
    format!("{}:{}:*", prefix, chain)
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Persistent map of pending transactions.
///
/// Every write refreshes or preserves the record's safety TTL; records that
/// outlive it disappear from the store on their own.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Inserts `record` unless one exists for the same key.
    ///
    /// Returns `false` when a record was already present.
    async fn create(&self, record: &TransactionRecord) -> Result<bool, StoreError>;

    async fn get(&self, chain: Chain, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError>;

    /// Narrows the outstanding stages to their intersection with `stages`.
    async fn update_stages(&self, chain: Chain, tx_hash: &str, stages: StageSet) -> Result<(), StoreError>;

    async fn update_error(&self, chain: Chain, tx_hash: &str, code: CheckCode, text: &str) -> Result<(), StoreError>;

    /// Stores transfer facts, overlaying newly known fields on earlier ones.
    async fn update_details(&self, chain: Chain, tx_hash: &str, details: &TransferDetails) -> Result<(), StoreError>;

    /// Restarts the record's safety TTL.
    async fn touch_ttl(&self, chain: Chain, tx_hash: &str) -> Result<(), StoreError>;

    /// Removes a record. Returns `false` when there was nothing to remove.
    async fn delete(&self, chain: Chain, tx_hash: &str) -> Result<bool, StoreError>;

    /// Lists every pending record of `chain`.
    async fn scan_all(&self, chain: Chain) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Takes the per-record check lock, or `None` while someone else holds it.
    async fn try_lock(&self, chain: Chain, tx_hash: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError>;

    /// Releases a lock taken with `token`; a lock held by another token is left alone.
    async fn unlock(&self, chain: Chain, tx_hash: &str, token: &LockToken) -> Result<(), StoreError>;
}
