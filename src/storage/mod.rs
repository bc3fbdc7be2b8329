//! Storage module for pending transaction records
//!
//! Provides the `PendingStore` interface with a Redis backend for production
//! and an in-memory backend for tests and single-process runs.

pub mod memory;
pub mod pending;
pub mod redis_store;

pub use memory::MemoryPendingStore;
pub use pending::{LockToken, PendingStore, StoreError, TransactionRecord};
pub use redis_store::RedisPendingStore;

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::StorageConfig;

/// Opens the store selected by `config`: Redis when `redis_url` is set, memory otherwise.
pub async fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn PendingStore>> {
    let ttl = Duration::from_secs(config.record_ttl_secs);
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisPendingStore::connect(url, &config.key_prefix, ttl).await?)),
        None => {
            warn!("No storage.redis_url configured; pending records are kept in memory only");
            Ok(Arc::new(MemoryPendingStore::new(&config.key_prefix, ttl)))
        }
    }
}
