//! Transfer Validation Module
//!
//! This module checks on-chain transactions against the transfer a requester
//! was asked to make: right token, right recipient, enough confirmations.
//! Each chain has a `StageChecker`; `CheckerSet` routes a chain to its checker.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::explorer::{EtherscanClient, TronscanClient};

pub mod erc20;
pub mod generic;
pub mod trc20;

pub use erc20::Erc20StageChecker;
pub use generic::{Chain, CheckCode, CheckResult, Stage, StageChecker, StageSet, TransferDetails};
pub use trc20::Trc20StageChecker;

/// Checkers for every enabled chain.
#[derive(Clone, Default)]
pub struct CheckerSet {
    checkers: HashMap<Chain, Arc<dyn StageChecker>>,
}

impl CheckerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds explorer clients and checkers for each chain present in `config`.
    ///
    /// # Returns
    ///
    /// * `Ok(CheckerSet)` - Checkers for the configured chains
    /// * `Err(anyhow::Error)` - An explorer client could not be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut set = Self::new();
        if let Some(erc20) = &config.erc20 {
            let client = Arc::new(EtherscanClient::new(erc20)?);
            set.insert(Arc::new(Erc20StageChecker::new(client, erc20)));
            info!("ERC-20 checks enabled via {}", erc20.explorer_url);
        }
        if let Some(trc20) = &config.trc20 {
            let client = Arc::new(TronscanClient::new(trc20)?);
            set.insert(Arc::new(Trc20StageChecker::new(client, trc20)));
            info!("TRC-20 checks enabled via {}", trc20.explorer_url);
        }
        Ok(set)
    }

    /// Registers `checker` under the chain it reports.
    pub fn insert(&mut self, checker: Arc<dyn StageChecker>) {
        self.checkers.insert(checker.chain(), checker);
    }

    pub fn get(&self, chain: Chain) -> Option<Arc<dyn StageChecker>> {
        self.checkers.get(&chain).cloned()
    }

    /// Enabled chains in a stable order.
    pub fn chains(&self) -> Vec<Chain> {
        Chain::ALL
            .into_iter()
            .filter(|c| self.checkers.contains_key(c))
            .collect()
    }
}
