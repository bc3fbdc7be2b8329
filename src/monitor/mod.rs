//! Pending Transaction Monitoring Module
//!
//! This module sweeps the pending store on a fixed interval, re-checks each
//! record's outstanding stages and drives records to their terminal outcome.
//! Records are checked concurrently up to a configured bound; a failure in
//! one record never aborts the sweep.

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::effects::Outcome;
use crate::storage::{PendingStore, TransactionRecord};
use crate::validator::{Chain, CheckCode, CheckResult, CheckerSet, StageChecker};

pub mod immediate;
pub mod outcome;

pub use immediate::{CheckRequest, ImmediateChecker, SubmitStatus};
pub use outcome::OutcomeHandler;

// ============================================================================
// SETTINGS AND STATISTICS
// ============================================================================

/// Timing and concurrency settings of the poller.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub polling_interval: Duration,
    /// Age after which a still-pending record expires
    pub max_pending: Duration,
    pub max_concurrent_checks: usize,
    pub lock_ttl: Duration,
}

impl From<&ServiceConfig> for MonitorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            polling_interval: config.polling_interval(),
            max_pending: config.max_pending(),
            max_concurrent_checks: config.max_concurrent_checks.max(1),
            lock_ttl: config.lock_ttl(),
        }
    }
}

/// What happened to one record during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    Confirmed,
    Rejected,
    Expired,
    StillPending,
    /// Another worker holds the record's lock
    Skipped,
}

/// Per-sweep counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub checked: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub still_pending: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepStats {
    fn count(&mut self, disposition: RecordDisposition) {
        match disposition {
            RecordDisposition::Confirmed => self.confirmed += 1,
            RecordDisposition::Rejected => self.rejected += 1,
            RecordDisposition::Expired => self.expired += 1,
            RecordDisposition::StillPending => self.still_pending += 1,
            RecordDisposition::Skipped => {
                self.skipped += 1;
                return;
            }
        }
        self.checked += 1;
    }
}

// ============================================================================
// PENDING MONITOR IMPLEMENTATION
// ============================================================================

/// Poller that drives pending records to a terminal outcome.
///
/// Cheap to clone; clones share the store, checkers and side effects.
#[derive(Clone)]
pub struct PendingMonitor {
    store: Arc<dyn PendingStore>,
    checkers: CheckerSet,
    outcomes: OutcomeHandler,
    settings: MonitorSettings,
}

impl PendingMonitor {
    /// Creates a new monitor.
    ///
    /// # Arguments
    ///
    /// * `store` - Pending record store
    /// * `checkers` - Stage checkers per enabled chain
    /// * `outcomes` - Terminal outcome handler
    /// * `settings` - Interval, pending window and concurrency bound
    pub fn new(
        store: Arc<dyn PendingStore>,
        checkers: CheckerSet,
        outcomes: OutcomeHandler,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            checkers,
            outcomes,
            settings,
        }
    }

    /// Sweeps on every tick until `shutdown` resolves.
    ///
    /// A sweep in progress when shutdown fires is finished first.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting pending transaction monitoring every {:?} for {:?}",
            self.settings.polling_interval,
            self.checkers.chains()
        );
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.settings.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Pending transaction monitoring stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let stats = self.sweep_once().await;
                    if stats != SweepStats::default() {
                        info!("Sweep finished: {:?}", stats);
                    } else {
                        debug!("Sweep finished: nothing pending");
                    }
                }
            }
        }
    }

    /// Checks every pending record of every enabled chain once.
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        for chain in self.checkers.chains() {
            self.sweep_chain(chain, &mut stats).await;
        }
        stats
    }

    async fn sweep_chain(&self, chain: Chain, stats: &mut SweepStats) {
        let records = match self.store.scan_all(chain).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to scan pending {} records: {}", chain, e);
                stats.errors += 1;
                return;
            }
        };
        if records.is_empty() {
            return;
        }
        debug!("Checking {} pending {} records", records.len(), chain);

        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_checks));
        let mut tasks = JoinSet::new();
        for record in records {
            let monitor = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let tx_hash = record.tx_hash.clone();
                let _permit = permits.acquire_owned().await;
                let outcome = AssertUnwindSafe(monitor.process_record(record))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(anyhow!("check panicked: {}", panic_message(panic.as_ref()))));
                (tx_hash, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(disposition))) => stats.count(disposition),
                Ok((tx_hash, Err(e))) => {
                    stats.errors += 1;
                    error!("internal_error while checking {} {}: {:#}", chain, tx_hash, e);
                    self.mark_internal_error(chain, &tx_hash, &e).await;
                }
                Err(e) => {
                    stats.errors += 1;
                    error!("Check task for {} was cancelled: {}", chain, e);
                }
            }
        }
    }

    /// Checks one record under its lock and applies the result.
    ///
    /// # Returns
    ///
    /// * `Ok(RecordDisposition)` - What happened to the record
    /// * `Err(anyhow::Error)` - Store or side-effect failure; the record stays pending
    pub async fn process_record(&self, record: TransactionRecord) -> Result<RecordDisposition> {
        let checker = self
            .checkers
            .get(record.chain)
            .ok_or_else(|| anyhow!("no checker configured for chain {}", record.chain))?;

        let Some(token) = self
            .store
            .try_lock(record.chain, &record.tx_hash, self.settings.lock_ttl)
            .await?
        else {
            debug!("Record {} is locked by another worker, skipping", record.tx_hash);
            return Ok(RecordDisposition::Skipped);
        };

        let result = self.evaluate(checker.as_ref(), &record).await;

        if let Err(e) = self.store.unlock(record.chain, &record.tx_hash, &token).await {
            warn!("Failed to release lock on {}: {}", record.tx_hash, e);
        }
        result
    }

    async fn evaluate(&self, checker: &dyn StageChecker, record: &TransactionRecord) -> Result<RecordDisposition> {
        let result = checker
            .check(&record.tx_hash, &record.target_address, record.outstanding_stages)
            .await;
        debug!(
            "Check of {} {}: {} {:?}",
            record.chain,
            record.tx_hash,
            result.status(),
            result.code()
        );

        match result {
            CheckResult::Confirmed(details) => {
                let details = record.details.clone().merge(details);
                self.outcomes.finalize(record, Outcome::Confirmed { details }).await?;
                Ok(RecordDisposition::Confirmed)
            }
            CheckResult::Failed { code, error, .. } => {
                self.outcomes.finalize(record, Outcome::Rejected { code, error }).await?;
                Ok(RecordDisposition::Rejected)
            }
            CheckResult::Pending {
                code,
                error,
                remaining,
                details,
            } => {
                if record.is_expired(Utc::now(), self.settings.max_pending) {
                    let outcome = Outcome::Expired {
                        last_code: Some(code),
                        last_error: Some(error),
                        window: self.settings.max_pending,
                    };
                    self.outcomes.finalize(record, outcome).await?;
                    return Ok(RecordDisposition::Expired);
                }

                let (chain, tx_hash) = (record.chain, record.tx_hash.as_str());
                self.store.update_stages(chain, tx_hash, remaining).await?;
                self.store.update_error(chain, tx_hash, code, &error).await?;
                if !details.is_empty() {
                    self.store.update_details(chain, tx_hash, &details).await?;
                }
                self.store.touch_ttl(chain, tx_hash).await?;
                Ok(RecordDisposition::StillPending)
            }
        }
    }

    /// Best-effort note of an unexpected failure on the record itself.
    async fn mark_internal_error(&self, chain: Chain, tx_hash: &str, error: &anyhow::Error) {
        if let Err(e) = self
            .store
            .update_error(chain, tx_hash, CheckCode::InternalError, &error.to_string())
            .await
        {
            debug!("Could not store internal_error on {}: {}", tx_hash, e);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
