//! Redis-backed pending store
//!
//! Records are JSON strings under `{prefix}:{chain}:{tx_hash}` with a safety
//! TTL. Updates use `SET ... XX KEEPTTL` so they never extend or drop the TTL;
//! only `touch_ttl` restarts it. Check locks are `SET NX PX` keys released
//! with a compare-and-delete script.

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{info, warn};

use super::pending::{chain_pattern, lock_key, record_key, LockToken, PendingStore, StoreError, TransactionRecord};
use crate::validator::{Chain, CheckCode, StageSet, TransferDetails};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 200;

/// Deletes the lock only if it still holds the caller's token.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// `PendingStore` backed by Redis.
#[derive(Clone)]
pub struct RedisPendingStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisPendingStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis URL (e.g., "redis://127.0.0.1:6379/0")
    /// * `key_prefix` - Prefix for record and lock keys
    /// * `ttl` - Safety TTL applied on create and `touch_ttl`
    ///
    /// # Returns
    ///
    /// * `Ok(RedisPendingStore)` - Connected store
    /// * `Err(anyhow::Error)` - Invalid URL or Redis unreachable
    pub async fn connect(url: &str, key_prefix: impl Into<String>, ttl: Duration) -> anyhow::Result<Self> {
        let client = Client::open(url).with_context(|| format!("Invalid Redis URL {}", url))?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        info!("Connected to Redis pending store");
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    fn encode(key: &str, record: &TransactionRecord) -> Result<String, StoreError> {
        serde_json::to_string(record).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })
    }

    fn decode(key: &str, raw: &str) -> Result<TransactionRecord, StoreError> {
        serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })
    }

    /// Read-modify-write of a record that keeps the remaining TTL.
    async fn modify<F>(&self, chain: Chain, tx_hash: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TransactionRecord) + Send,
    {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(key));
        };
        let mut record = Self::decode(&key, &raw)?;
        f(&mut record);
        let encoded = Self::encode(&key, &record)?;

        let written: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(encoded)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        match written {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key)),
        }
    }
}

#[async_trait]
impl PendingStore for RedisPendingStore {
    async fn create(&self, record: &TransactionRecord) -> Result<bool, StoreError> {
        let key = record_key(&self.key_prefix, record.chain, &record.tx_hash);
        let encoded = Self::encode(&key, record)?;
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(encoded)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    async fn get(&self, chain: Chain, tx_hash: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        raw.map(|raw| Self::decode(&key, &raw)).transpose()
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
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(key));
        }
        Ok(())
    }

    async fn delete(&self, chain: Chain, tx_hash: &str) -> Result<bool, StoreError> {
        let key = record_key(&self.key_prefix, chain, tx_hash);
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(&key).await?;
        Ok(removed > 0)
    }

    async fn scan_all(&self, chain: Chain) -> Result<Vec<TransactionRecord>, StoreError> {
        let pattern = chain_pattern(&self.key_prefix, chain);
        let mut conn = self.conn.clone();

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            // Deleted between SCAN and GET
            let Some(raw) = raw else { continue };
            match Self::decode(&key, &raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable pending record: {}", e),
            }
        }
        records.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        Ok(records)
    }

    async fn try_lock(&self, chain: Chain, tx_hash: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError> {
        let key = lock_key(&self.key_prefix, chain, tx_hash);
        let token = LockToken::generate();
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.map(|_| token))
    }

    async fn unlock(&self, chain: Chain, tx_hash: &str, token: &LockToken) -> Result<(), StoreError> {
        let key = lock_key(&self.key_prefix, chain, tx_hash);
        let mut conn = self.conn.clone();
        let script = Script::new(UNLOCK_SCRIPT);
        let _released: i64 = script
            .key(&key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
