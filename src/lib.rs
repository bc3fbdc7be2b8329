//! Transfer Verifier Service Library
//!
//! This crate verifies stablecoin transfers on Ethereum (ERC-20) and Tron
//! (TRC-20) through block explorers and tracks unconfirmed transfers until
//! they are confirmed, rejected or expire.

pub mod api;
pub mod config;
pub mod effects;
pub mod explorer;
pub mod messages;
pub mod monitor;
pub mod storage;
pub mod transfer_decoder;
pub mod tx_hash;
pub mod validator;

// Re-export commonly used types
pub use config::{ApiConfig, ChainConfig, Config, ServiceConfig, StorageConfig};
pub use effects::{Outcome, SideEffects};
pub use monitor::{ImmediateChecker, MonitorSettings, OutcomeHandler, PendingMonitor, SweepStats};
pub use storage::{PendingStore, TransactionRecord};
pub use validator::{Chain, CheckCode, CheckResult, CheckerSet, Stage, StageChecker, StageSet, TransferDetails};
