//! Bridge service
//!
//! Holds the two ledger clients, the controller keys and the configuration.
//! Every operation takes `&self` and rebuilds custody state from the ledgers;
//! nothing is cached between calls. Operations live in `accessors`,
//! `registrar` and `protocol`.

use bridge_types::controller::{Controller, FirstVault, VaultSelector};
use bridge_types::custody::Mint;
use chrono::Utc;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::keys::ControllerKeys;
use crate::ledger::mint::MintLedger;
use crate::ledger::source::{SourceAccount, SourceLedger, SourceOperation, SourceTransaction, SourceTransactionBuilder};

pub struct BridgeService<S, M> {
    pub(crate) source: Arc<S>,
    pub(crate) mint: Arc<M>,
    pub(crate) keys: ControllerKeys,
    pub(crate) config: BridgeConfig,
    pub(crate) selector: Arc<dyn VaultSelector>,
}

impl<S, M> BridgeService<S, M>
where
    S: SourceLedger,
    M: MintLedger,
{
    /// Service using the [`FirstVault`] selection strategy.
    pub fn new(source: Arc<S>, mint: Arc<M>, keys: ControllerKeys, config: BridgeConfig) -> Self {
        Self::with_selector(source, mint, keys, config, Arc::new(FirstVault))
    }

    pub fn with_selector(
        source: Arc<S>,
        mint: Arc<M>,
        keys: ControllerKeys,
        config: BridgeConfig,
        selector: Arc<dyn VaultSelector>,
    ) -> Self {
        Self {
            source,
            mint,
            keys,
            config,
            selector,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn keys(&self) -> &ControllerKeys {
        &self.keys
    }

    /// Controller over the vaults currently on the Source Ledger.
    pub(crate) async fn load_controller(&self, mints: Vec<Mint>) -> Result<Controller, BridgeError> {
        let vaults = self.existing_vaults().await?;
        Ok(Controller::with_selector(vaults, mints, Arc::clone(&self.selector)))
    }

    /// Build a transaction sourced from `account` with the configured timeout.
    pub(crate) async fn build_source_transaction(
        &self,
        account: &SourceAccount,
        operations: Vec<SourceOperation>,
    ) -> Result<SourceTransaction, BridgeError> {
        let base_fee = self.source.fetch_base_fee().await?;
        let tx = operations
            .into_iter()
            .fold(SourceTransactionBuilder::new(account, base_fee), |b, op| b.add_operation(op))
            .set_timeout(Utc::now(), self.config.tx_timeout_secs)
            .build()?;
        Ok(tx)
    }
}
