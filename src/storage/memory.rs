//! In-memory pending store
//!
//! Keeps records in a HashMap behind a RwLock. Used in tests and for
//! single-process deployments without Redis; contents are lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::pending::{lock_key, record_key, LockToken, PendingStore, StoreError, TransactionRecord};
use crate::validator::{Chain, CheckCode, StageSet, TransferDetails};

struct Entry {
    record: TransactionRecord,
    expires_at: Instant,
}

/// In-memory `PendingStore` with the same TTL and lock semantics as Redis.
pub struct MemoryPendingStore {
    key_prefix: String,
    ttl: Duration,
    /// Map of record key -> entry
    records: RwLock<HashMap<String, Entry>>,
    /// Map of lock key -> (token, expiry)
    locks: Mutex<HashMap<String, (LockToken, Instant)>>,
}

impl MemoryPendingStore {
    /// Create a new store.
    ///
    /// # Arguments
    ///
    /// * `key_prefix` - Prefix for record keys
    /// * `ttl` - Safety TTL applied on create and `touch_ttl`
    pub fn new(key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl,
            records: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live records across all chains.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Applies `f` to a live record, keeping its TTL.
    async fn modify<F>(&self, chain: Chain, tx_hash: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TransactionRecord) + Send,
    {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let mut records = self.records.write().await;
        match records.get_mut(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                f(&mut entry.record);
                Ok(())
            }
            _ => Err(StoreError::NotFound(key)),
        }
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn create(&self, record: &TransactionRecord) -> Result<bool, StoreError> {
        let key = record_key(&self.key_prefix, record.chain, &record.tx_hash);
        let now = Instant::now();
        let mut records = self.records.write().await;
        if matches!(records.get(&key), Some(entry) if entry.expires_at > now) {
            return Ok(false);
        }
        records.insert(
            key,
            Entry {
                record: record.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, chain: Chain, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let records = self.records.read().await;
        Ok(records
            .get(&key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.record.clone()))
    }

    async fn update_stages(&self, chain: Chain, tx_hash: &str, stages: StageSet) -> Result<(), StoreError> {
        self.modify(chain, tx_hash, |record| {
            record.outstanding_stages = record.outstanding_stages.intersection(stages);
        })
        .await
    }

    async fn update_error(&self, chain: Chain, tx_hash: &str, code: CheckCode, text: &str) -> Result<(), StoreError> {
        let text = text.to_string();
        self.modify(chain, tx_hash, move |record| {
            record.last_error_code = Some(code);
            record.last_error_text = Some(text);
        })
        .await
    }

    async fn update_details(&self, chain: Chain, tx_hash: &str, details: &TransferDetails) -> Result<(), StoreError> {
        let details = details.clone();
        self.modify(chain, tx_hash, move |record| {
            record.details = std::mem::take(&mut record.details).merge(details);
        })
        .await
    }

    async fn touch_ttl(&self, chain: Chain, tx_hash: &str) -> Result<(), StoreError> {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let now = Instant::now();
        let mut records = self.records.write().await;
        match records.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Ok(())
            }
            _ => Err(StoreError::NotFound(key)),
        }
    }

    async fn delete(&self, chain: Chain, tx_hash: &str) -> Result<bool, StoreError> {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let removed = self.records.write().await.remove(&key);
        Ok(matches!(removed, Some(entry) if entry.expires_at > Instant::now()))
    }

    async fn scan_all(&self, chain: Chain) -> Result<Vec<TransactionRecord>, StoreError> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        records.retain(|_, e| e.expires_at > now);
        let mut found: Vec<TransactionRecord> = records
            .values()
            .filter(|e| e.record.chain == chain)
            .map(|e| e.record.clone())
            .collect();
        found.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        Ok(found)
    }

    async fn try_lock(&self, chain: Chain, tx_hash: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError> {
        let key = lock_key(&self.key_prefix, chain, tx_hash);
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if matches!(locks.get(&key), Some((_, expires_at)) if *expires_at > now) {
            return Ok(None);
        }
        let token = LockToken::generate();
        locks.insert(key, (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn unlock(&self, chain: Chain, tx_hash: &str, token: &LockToken) -> Result<(), StoreError> {
        let key = lock_key(&self.key_prefix, chain, tx_hash);
        let mut locks = self.locks.lock().await;
        if matches!(locks.get(&key), Some((held, _)) if held == token) {
            locks.remove(&key);
        }
        Ok(())
    }
}
