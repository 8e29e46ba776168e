//! Bridge scenarios
//!
//! End-to-end runs of the custody set-up and the lock/mint round trip,
//! driving every party through the harness.

use bridge_core::commitment::SignatureCommitment;
use bridge_core::intents::{BeginLockIntent, BeginMintIntent};
use bridge_core::ledger::mint::{MintInstruction, MintLedger};
use bridge_core::BridgeError;
use bridge_types::asset::Asset;
use bridge_types::ids::{PublicKey, SignatureBytes, TransactionHash};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::harness::{mint_signers, source_signers, BridgeHarness, Participant};

/// Validators registered on a vault and on the mint of one asset.
#[derive(Debug)]
pub struct Custody {
    pub validators: Vec<Participant>,
    pub issuer: Participant,
    pub asset: Asset,
    pub vault: PublicKey,
    pub mint: PublicKey,
}

/// Configuration for the round-trip scenario.
#[derive(Debug, Clone)]
pub struct RoundTripConfig {
    pub validators: usize,
    pub asset_code: String,
    pub amount: Decimal,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            validators: 2,
            asset_code: "USDC".to_string(),
            amount: Decimal::from(100),
        }
    }
}

/// Identifiers produced by one deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTripOutcome {
    pub etxa: PublicKey,
    pub vault: PublicKey,
    pub mint: PublicKey,
    pub target_wallet: PublicKey,
    /// Commitment returned with the verified mint transaction.
    pub commitment: SignatureCommitment,
    pub minted_units: u64,
    pub mint_transaction: SignatureBytes,
    pub release_transaction: TransactionHash,
}

/// A deposit that has been locked and committed but not yet minted.
#[derive(Debug)]
pub struct PendingDeposit {
    pub user: Participant,
    pub etxa: PublicKey,
    pub lock: BeginLockIntent,
    pub begin_mint: BeginMintIntent,
}

/// Register `count` validators on a single vault and on a fresh mint for
/// `asset_code`.
pub async fn establish_custody(
    harness: &BridgeHarness,
    count: usize,
    asset_code: &str,
) -> Result<Custody, BridgeError> {
    let service = &harness.service;
    let mut validators: Vec<Participant> = Vec::with_capacity(count);
    let mut vault = None;

    for _ in 0..count {
        validators.push(harness.participant().await);
        let joining = &validators[validators.len() - 1];
        let intent = service.register_validator_intent(&joining.validator()).await?;
        let signers = source_signers(&validators, &intent.pending_signers);
        harness.submit_source(intent.transaction, &signers).await?;
        vault = Some(intent.vault);
    }
    let vault = vault.ok_or_else(|| BridgeError::MalformedData {
        field: "validators".to_string(),
        reason: "custody needs at least one validator".to_string(),
    })?;

    let issuer = harness.participant().await;
    let asset = Asset::credit(asset_code, issuer.source_key());
    let created = service.create_mint(&asset).await?;

    for validator in &validators {
        let intent = service.add_validator_to_mint_intent(&validator.validator(), &asset).await?;
        let signers = mint_signers(&validators, &intent.pending_signers);
        harness.submit_mint(intent.transaction, &signers).await?;
    }

    info!(vault = %vault, mint = %created.mint_address, validators = count, "Custody established");
    Ok(Custody {
        validators,
        issuer,
        asset,
        vault,
        mint: created.mint_address,
    })
}

/// Lock `amount` for a new user and record the mint commitment.
pub async fn lock_and_commit(
    harness: &BridgeHarness,
    custody: &Custody,
    amount: Decimal,
) -> Result<PendingDeposit, BridgeError> {
    let service = &harness.service;
    let user = harness.participant().await;
    harness.source.issue(&user.source_key(), &custody.asset, amount).await?;

    let lock = service
        .begin_lock(&custody.asset, amount, &user.user(), &user.mint_key())
        .await?;
    harness.submit_source(lock.transaction.clone(), &[&user.source]).await?;

    let begin_mint = service.begin_mint(&user.user(), &lock.etxa).await?;
    let signers = source_signers(&custody.validators, &begin_mint.pending_signers);
    harness
        .submit_source(begin_mint.source_transaction.clone(), &signers)
        .await?;

    Ok(PendingDeposit {
        etxa: lock.etxa,
        user,
        lock,
        begin_mint,
    })
}

/// Mint the committed transaction and release the deposit into the vault.
pub async fn mint_and_release(
    harness: &BridgeHarness,
    custody: &Custody,
    deposit: &PendingDeposit,
) -> Result<RoundTripOutcome, BridgeError> {
    let service = &harness.service;
    let completed = service
        .complete_mint(&deposit.user.user(), &deposit.etxa, deposit.begin_mint.mint_transaction.clone())
        .await?;

    let mut signers = mint_signers(&custody.validators, &completed.pending_signers);
    signers.push(&deposit.user.mint);
    let mint_transaction = harness.submit_mint(completed.mint_transaction, &signers).await?;

    let release = service.complete_lock(&deposit.etxa, &mint_transaction).await?;
    let signers = source_signers(&custody.validators, &release.pending_signers);
    let release_transaction = harness.submit_source(release.transaction, &signers).await?;

    let minted_units = harness
        .mint
        .get_transaction(&mint_transaction)
        .await?
        .map(|confirmed| {
            confirmed
                .transaction
                .instructions
                .iter()
                .map(|i| match i {
                    MintInstruction::MintTo { amount, .. } => *amount,
                    _ => 0,
                })
                .sum::<u64>()
        })
        .unwrap_or(0);

    info!(
        etxa = %deposit.etxa,
        vault = %release.vault,
        units = minted_units,
        "Round trip complete"
    );

    Ok(RoundTripOutcome {
        etxa: release.etxa,
        vault: release.vault,
        mint: custody.mint,
        target_wallet: completed.target_wallet,
        commitment: completed.commitment,
        minted_units,
        mint_transaction,
        release_transaction,
    })
}

/// Full run: custody set-up, lock, mint and release.
pub async fn run_round_trip(
    harness: &BridgeHarness,
    config: &RoundTripConfig,
) -> Result<(Custody, RoundTripOutcome), BridgeError> {
    let custody = establish_custody(harness, config.validators, &config.asset_code).await?;
    let deposit = lock_and_commit(harness, &custody, config.amount).await?;
    let outcome = mint_and_release(harness, &custody, &deposit).await?;
    Ok((custody, outcome))
}
