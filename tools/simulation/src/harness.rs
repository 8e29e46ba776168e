//! Bridge harness
//!
//! Wires a `BridgeService` to both in-memory ledgers on a shared clock and
//! plays the external parties: validators and users holding their own keys,
//! signing intents and submitting them.

use bridge_core::ledger::mint::{MintLedger, MintTransaction};
use bridge_core::ledger::source::{SourceLedger, SourceTransaction};
use bridge_core::{BridgeConfig, BridgeError, BridgeService, ControllerKeys};
use bridge_types::controller::{FirstVault, VaultSelector};
use bridge_types::custody::{User, Validator};
use bridge_types::ids::{PublicKey, SignatureBytes, TransactionHash};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::SimClock;
use crate::mint_ledger::{InMemoryMintLedger, LAMPORTS_PER_SOL};
use crate::source_ledger::InMemorySourceLedger;

/// Native balance every participant starts with on the Source Ledger.
pub const PARTICIPANT_SOURCE_FUNDS: i64 = 1_000;

/// A party holding one key on each ledger.
#[derive(Debug)]
pub struct Participant {
    pub source: SigningKey,
    pub mint: SigningKey,
}

impl Participant {
    pub fn generate() -> Self {
        Self {
            source: SigningKey::generate(&mut OsRng),
            mint: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn source_key(&self) -> PublicKey {
        PublicKey::from(&self.source)
    }

    pub fn mint_key(&self) -> PublicKey {
        PublicKey::from(&self.mint)
    }

    pub fn validator(&self) -> Validator {
        Validator::new(self.source_key(), self.mint_key())
    }

    pub fn user(&self) -> User {
        User::new(self.source_key(), self.mint_key())
    }
}

/// Source Ledger keys of `participants` that appear in `pending`.
pub fn source_signers<'a>(participants: &'a [Participant], pending: &[PublicKey]) -> Vec<&'a SigningKey> {
    participants
        .iter()
        .filter(|p| pending.contains(&p.source_key()))
        .map(|p| &p.source)
        .collect()
}

/// Mint Ledger keys of `participants` that appear in `pending`.
pub fn mint_signers<'a>(participants: &'a [Participant], pending: &[PublicKey]) -> Vec<&'a SigningKey> {
    participants
        .iter()
        .filter(|p| pending.contains(&p.mint_key()))
        .map(|p| &p.mint)
        .collect()
}

pub struct BridgeHarness {
    pub clock: SimClock,
    pub source: Arc<InMemorySourceLedger>,
    pub mint: Arc<InMemoryMintLedger>,
    pub service: BridgeService<InMemorySourceLedger, InMemoryMintLedger>,
}

impl BridgeHarness {
    /// Fresh ledgers and controller keys, with the configuration account
    /// and the controller's mint key funded.
    pub async fn new(config: BridgeConfig) -> Self {
        Self::with_selector(config, Arc::new(FirstVault)).await
    }

    /// Same as [`BridgeHarness::new`], choosing vaults with `selector`.
    pub async fn with_selector(config: BridgeConfig, selector: Arc<dyn VaultSelector>) -> Self {
        let clock = SimClock::new();
        let source = Arc::new(InMemorySourceLedger::new(config.network_passphrase.clone(), clock.clone()));
        let mint = Arc::new(InMemoryMintLedger::new());
        let keys = ControllerKeys::generate();

        source.fund(keys.source_config_key(), Decimal::from(100)).await;
        mint.airdrop(keys.mint_controller_key(), 10 * LAMPORTS_PER_SOL).await;
        info!(keys = ?keys, "Bridge harness ready");

        let service = BridgeService::with_selector(Arc::clone(&source), Arc::clone(&mint), keys, config, selector);
        Self {
            clock,
            source,
            mint,
            service,
        }
    }

    /// New participant funded on both ledgers.
    pub async fn participant(&self) -> Participant {
        let participant = Participant::generate();
        self.source
            .fund(participant.source_key(), Decimal::from(PARTICIPANT_SOURCE_FUNDS))
            .await;
        self.mint.airdrop(participant.mint_key(), LAMPORTS_PER_SOL).await;
        debug!(source = %participant.source_key(), mint = %participant.mint_key(), "Funded participant");
        participant
    }

    /// Add `signers`' signatures and submit to the Source Ledger.
    pub async fn submit_source(
        &self,
        mut transaction: SourceTransaction,
        signers: &[&SigningKey],
    ) -> Result<TransactionHash, BridgeError> {
        let passphrase = &self.service.config().network_passphrase;
        for key in signers {
            transaction.sign(key, passphrase)?;
        }
        Ok(self.source.submit_transaction(transaction.into()).await?)
    }

    /// Add `signers`' signatures and send to the Mint Ledger.
    pub async fn submit_mint(
        &self,
        mut transaction: MintTransaction,
        signers: &[&SigningKey],
    ) -> Result<SignatureBytes, BridgeError> {
        for key in signers {
            transaction.partial_sign(key)?;
        }
        Ok(self.mint.send_transaction(transaction).await?)
    }
}
