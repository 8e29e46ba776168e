//! Bridge round-trip tests
//!
//! Runs the protocol against both in-memory ledgers:
//! - Full lock, mint and release
//! - Release into the lock-time vault under a custom vault selector
//! - Commitment enforcement on tampered or unrelated mint transactions
//! - Registration order and duplicate mints
//! - Escrow state guards and the depositor's reclaim path
//! - Atomic rejection and fee-bump submission

use bridge_core::ledger::mint::{MintInstruction, MintLedger, MintTransaction};
use bridge_core::ledger::source::{
    FeeBumpTransaction, SourceAccount, SourceLedger, SourceOperation, SourceTransactionBuilder,
};
use bridge_core::{BridgeConfig, BridgeError, LedgerError};
use bridge_types::asset::Asset;
use bridge_types::controller::VaultSelector;
use bridge_types::custody::Vault;
use bridge_types::errors::CustodyError;
use bridge_types::escrow::EscrowState;
use bridge_types::ids::PublicKey;
use ledger_sim::harness::{mint_signers, source_signers, BridgeHarness, Participant};
use ledger_sim::scenarios::{
    establish_custody, lock_and_commit, mint_and_release, run_round_trip, Custody, RoundTripConfig,
};
use ledger_sim::source_ledger::BASE_FEE;
use rust_decimal::Decimal;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn harness() -> BridgeHarness {
    init_tracing();
    BridgeHarness::new(BridgeConfig::default()).await
}

// ═══════════════════════════════════════════════════════════════════
// Round Trip
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_round_trip_mints_and_releases_into_vault() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 2, "USDC").await.unwrap();
    let deposit = lock_and_commit(&harness, &custody, Decimal::from(100)).await.unwrap();
    let outcome = mint_and_release(&harness, &custody, &deposit).await.unwrap();

    // release reports the lock-time ids and the recorded commitment
    assert_eq!(outcome.vault, deposit.lock.vault);
    assert_eq!(outcome.etxa, deposit.lock.etxa);
    assert_eq!(outcome.commitment, deposit.begin_mint.commitment);

    assert_eq!(outcome.minted_units, 1_000_000_000);
    assert_eq!(harness.mint.token_balance(&custody.mint, &outcome.target_wallet).await, 1_000_000_000);
    assert_eq!(harness.mint.get_mint(&custody.mint).await.unwrap().supply, 1_000_000_000);

    let vault = harness.source.load_account(&custody.vault).await.unwrap();
    assert_eq!(vault.balance_of(&custody.asset), Decimal::from(100));

    let escrow = harness.service.load_escrow(&outcome.etxa).await.unwrap();
    assert_eq!(escrow.state, EscrowState::SourceReleased);
    assert!(harness.source.claimable_balances_for_claimant(&outcome.etxa).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_round_trip_with_three_validators() {
    let harness = harness().await;
    let config = RoundTripConfig {
        validators: 3,
        asset_code: "EURC".to_string(),
        amount: Decimal::new(12_345_678, 7),
    };
    let (custody, outcome) = run_round_trip(&harness, &config).await.unwrap();

    assert_eq!(outcome.minted_units, 12_345_678);
    let vaults = harness.service.existing_vaults().await.unwrap();
    assert_eq!(vaults.len(), 1);
    assert_eq!(vaults[0].validator_count(), 3);

    let mint = harness.service.discover_mint(&custody.asset).await.unwrap();
    assert_eq!(mint.validators.len(), 3);
    assert_eq!(harness.mint.get_multisig(&mint.authority).await.unwrap().members().len(), 4);
}

#[tokio::test]
async fn test_vault_weights_after_second_validator() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 2, "USDC").await.unwrap();

    let vault = harness.source.load_account(&custody.vault).await.unwrap();
    let controller = harness.service.keys().source_controller_key();
    assert_eq!(vault.master_weight, 0);
    assert_eq!(vault.signer_weight(&controller), 2);
    assert_eq!(vault.thresholds.high, 3);
    for validator in &custody.validators {
        assert_eq!(vault.signer_weight(&validator.source_key()), 1);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Vault Selection
// ═══════════════════════════════════════════════════════════════════

fn fewest_validators(vaults: &[Vault]) -> Option<usize> {
    vaults
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| v.validator_count())
        .map(|(i, _)| i)
}

fn most_validators(vaults: &[Vault]) -> Option<usize> {
    vaults
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| v.validator_count())
        .map(|(i, _)| i)
}

/// Registers into the emptiest vault and locks into the fullest.
struct LoadAware;

impl VaultSelector for LoadAware {
    fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize> {
        fewest_validators(vaults)
    }

    fn select_for_lock(&self, vaults: &[Vault], _: &Asset, _: Decimal) -> Option<usize> {
        most_validators(vaults)
    }
}

/// Like `LoadAware`, but releases into the emptiest vault.
struct ReleaseToEmptiest;

impl VaultSelector for ReleaseToEmptiest {
    fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize> {
        fewest_validators(vaults)
    }

    fn select_for_lock(&self, vaults: &[Vault], _: &Asset, _: Decimal) -> Option<usize> {
        most_validators(vaults)
    }

    fn select_for_release(&self, vaults: &[Vault], _: &PublicKey) -> Option<usize> {
        fewest_validators(vaults)
    }
}

/// Vault A with two validators, vault B with one, and all three on the mint.
/// Returns the custody (vault A) and vault B.
async fn two_vault_custody(harness: &BridgeHarness) -> (Custody, PublicKey) {
    let service = &harness.service;
    let mut validators: Vec<Participant> = Vec::new();

    for _ in 0..2 {
        validators.push(harness.participant().await);
        let joining = &validators[validators.len() - 1];
        let intent = service.register_validator_intent(&joining.validator()).await.unwrap();
        let signers = source_signers(&validators, &intent.pending_signers);
        harness.submit_source(intent.transaction, &signers).await.unwrap();
    }
    validators.push(harness.participant().await);
    let second = service.bootstrap_vault_intent(&validators[2].validator()).await.unwrap();
    let vault_b = second.vault;
    harness.submit_source(second.transaction, &[&validators[2].source]).await.unwrap();

    let vaults = service.existing_vaults().await.unwrap();
    assert_eq!(vaults.len(), 2);
    let vault_a = vaults.iter().find(|v| v.account_id != vault_b).unwrap();
    assert_eq!(vault_a.validator_count(), 2);

    let issuer = harness.participant().await;
    let asset = Asset::credit("USDC", issuer.source_key());
    let created = service.create_mint(&asset).await.unwrap();
    for validator in &validators {
        let intent = service.add_validator_to_mint_intent(&validator.validator(), &asset).await.unwrap();
        let signers = mint_signers(&validators, &intent.pending_signers);
        harness.submit_mint(intent.transaction, &signers).await.unwrap();
    }

    let custody = Custody {
        vault: vault_a.account_id,
        validators,
        issuer,
        asset,
        mint: created.mint_address,
    };
    (custody, vault_b)
}

#[tokio::test]
async fn test_release_pays_lock_vault_under_custom_selector() {
    init_tracing();
    let harness = BridgeHarness::with_selector(BridgeConfig::default(), Arc::new(LoadAware)).await;
    let (custody, vault_b) = two_vault_custody(&harness).await;

    let deposit = lock_and_commit(&harness, &custody, Decimal::from(100)).await.unwrap();
    assert_eq!(deposit.lock.vault, custody.vault);
    assert_eq!(harness.service.load_escrow(&deposit.etxa).await.unwrap().vault, custody.vault);

    let outcome = mint_and_release(&harness, &custody, &deposit).await.unwrap();
    assert_eq!(outcome.vault, deposit.lock.vault);

    let locked = harness.source.load_account(&custody.vault).await.unwrap();
    assert_eq!(locked.balance_of(&custody.asset), Decimal::from(100));
    let other = harness.source.load_account(&vault_b).await.unwrap();
    assert_eq!(other.balance_of(&custody.asset), Decimal::ZERO);
}

#[tokio::test]
async fn test_release_refuses_vault_other_than_lock_vault() {
    init_tracing();
    let harness = BridgeHarness::with_selector(BridgeConfig::default(), Arc::new(ReleaseToEmptiest)).await;
    let (custody, vault_b) = two_vault_custody(&harness).await;

    let deposit = lock_and_commit(&harness, &custody, Decimal::from(100)).await.unwrap();
    let err = mint_and_release(&harness, &custody, &deposit).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Custody(CustodyError::UnknownVault { .. })
    ));

    let escrow = harness.service.load_escrow(&deposit.etxa).await.unwrap();
    assert_eq!(escrow.state, EscrowState::TargetStarted);
    for vault in [custody.vault, vault_b] {
        let account = harness.source.load_account(&vault).await.unwrap();
        assert_eq!(account.balance_of(&custody.asset), Decimal::ZERO);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Commitment Enforcement
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_tampered_mint_transaction_rejected() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 2, "USDC").await.unwrap();
    let deposit = lock_and_commit(&harness, &custody, Decimal::from(100)).await.unwrap();

    let mut tampered = deposit.begin_mint.mint_transaction.clone();
    if let MintInstruction::MintTo { amount, .. } = &mut tampered.instructions[0] {
        *amount += 1;
    }
    let err = harness
        .service
        .complete_mint(&deposit.user.user(), &deposit.etxa, tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SignatureCommitmentMismatch { .. }));

    let escrow = harness.service.load_escrow(&deposit.etxa).await.unwrap();
    assert_eq!(escrow.state, EscrowState::TargetStarted);
    assert_eq!(harness.mint.token_balance(&custody.mint, &deposit.user.mint_key()).await, 0);
}

#[tokio::test]
async fn test_mint_transaction_without_controller_slot_rejected() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let deposit = lock_and_commit(&harness, &custody, Decimal::from(100)).await.unwrap();

    let blockhash = harness.mint.latest_blockhash().await.unwrap();
    let foreign = MintTransaction::new(
        deposit.user.mint_key(),
        blockhash,
        vec![MintInstruction::MintTo {
            mint: custody.mint,
            destination: deposit.user.mint_key(),
            authority: deposit.user.mint_key(),
            amount: 1,
            multisig_signers: Vec::new(),
        }],
    );
    let err = harness
        .service
        .complete_mint(&deposit.user.user(), &deposit.etxa, foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SignatureCommitmentMismatch { .. }));
}

#[tokio::test]
async fn test_complete_lock_rejects_unrelated_mint_transaction() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let deposit = lock_and_commit(&harness, &custody, Decimal::from(5)).await.unwrap();

    let other = harness
        .service
        .create_mint(&Asset::credit("OTHER", custody.issuer.source_key()))
        .await
        .unwrap();
    let err = harness
        .service
        .complete_lock(&deposit.etxa, &other.mint_transaction)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SignatureCommitmentMismatch { .. }));

    let before = harness.source.snapshot().await;
    let unknown = bridge_types::ids::SignatureBytes::from([7u8; 64]);
    let err = harness.service.complete_lock(&deposit.etxa, &unknown).await.unwrap_err();
    assert!(matches!(err, BridgeError::Ledger(LedgerError::NotFound { .. })));
    assert_eq!(harness.source.snapshot().await, before);
}

// ═══════════════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unregistered_validator_cannot_join_mint() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let outsider = harness.participant().await;

    let err = harness
        .service
        .add_validator_to_mint_intent(&outsider.validator(), &custody.asset)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Custody(CustodyError::ValidatorNotRegistered { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_create_mint_rejected() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let transactions = harness.mint.transaction_count().await;

    let err = harness.service.create_mint(&custody.asset).await.unwrap_err();
    assert!(matches!(err, BridgeError::MintAlreadyRecorded { .. }));
    assert_eq!(harness.mint.transaction_count().await, transactions);
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 2, "USDC").await.unwrap();

    let first = harness.service.existing_vaults().await.unwrap();
    let second = harness.service.existing_vaults().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].account_id, custody.vault);

    let mint = harness.service.discover_mint(&custody.asset).await.unwrap();
    assert_eq!(mint, harness.service.discover_mint(&custody.asset).await.unwrap());
    assert_eq!(mint.mint_address, custody.mint);
}

#[tokio::test]
async fn test_lock_refused_until_mint_has_validators() {
    let harness = harness().await;
    let validator = harness.participant().await;
    let intent = harness.service.register_validator_intent(&validator.validator()).await.unwrap();
    harness.submit_source(intent.transaction, &[&validator.source]).await.unwrap();

    let user = harness.participant().await;
    let asset = Asset::credit("USDC", validator.source_key());
    let err = harness
        .service
        .begin_lock(&asset, Decimal::from(1), &user.user(), &user.mint_key())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MintNotRecorded { .. }));

    harness.service.create_mint(&asset).await.unwrap();
    let err = harness
        .service
        .begin_lock(&asset, Decimal::from(1), &user.user(), &user.mint_key())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MintHasNoValidators { .. }));
}

#[tokio::test]
async fn test_lock_rejects_sub_unit_amount() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let user = harness.participant().await;

    let err = harness
        .service
        .begin_lock(&custody.asset, Decimal::new(1, 8), &user.user(), &user.mint_key())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidAmount { .. }));
}

// ═══════════════════════════════════════════════════════════════════
// Escrow States
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_escrow_state_guards() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let user = harness.participant().await;
    harness
        .source
        .issue(&user.source_key(), &custody.asset, Decimal::from(10))
        .await
        .unwrap();
    let lock = harness
        .service
        .begin_lock(&custody.asset, Decimal::from(10), &user.user(), &user.mint_key())
        .await
        .unwrap();
    let etxa = lock.etxa;
    harness.submit_source(lock.transaction.clone(), &[&user.source]).await.unwrap();

    let escrow = harness.service.load_escrow(&etxa).await.unwrap();
    assert_eq!(escrow.state, EscrowState::SourceStarted);
    assert_eq!(escrow.vault, custody.vault);
    assert_eq!(escrow.depositor, user.source_key());
    assert_eq!(escrow.target_wallet, user.mint_key());
    assert_eq!(escrow.validators, vec![custody.validators[0].source_key()]);

    let unknown = bridge_types::ids::SignatureBytes::from([1u8; 64]);
    let err = harness.service.complete_lock(&etxa, &unknown).await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidEscrowState { .. }));

    let deposit = ledger_sim::scenarios::PendingDeposit {
        begin_mint: harness.service.begin_mint(&user.user(), &etxa).await.unwrap(),
        etxa,
        lock,
        user,
    };
    harness
        .submit_source(
            deposit.begin_mint.source_transaction.clone(),
            &[&custody.validators[0].source],
        )
        .await
        .unwrap();
    let err = harness.service.begin_mint(&deposit.user.user(), &etxa).await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidEscrowState { .. }));

    mint_and_release(&harness, &custody, &deposit).await.unwrap();
    let err = harness
        .service
        .complete_mint(&deposit.user.user(), &etxa, deposit.begin_mint.mint_transaction.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidEscrowState { .. }));
}

#[tokio::test]
async fn test_depositor_reclaims_after_claim_window() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let user = harness.participant().await;
    let amount = Decimal::from(25);
    harness.source.issue(&user.source_key(), &custody.asset, amount).await.unwrap();

    let lock = harness
        .service
        .begin_lock(&custody.asset, amount, &user.user(), &user.mint_key())
        .await
        .unwrap();
    let etxa = lock.etxa;
    harness.submit_source(lock.transaction, &[&user.source]).await.unwrap();

    let balance = harness
        .source
        .claimable_balances_for_claimant(&user.source_key())
        .await
        .unwrap()
        .remove(0);
    let reclaim = |account: SourceAccount| {
        SourceTransactionBuilder::new(&account, BASE_FEE)
            .add_operation(SourceOperation::claim_claimable_balance(balance.id.clone()))
            .build()
            .unwrap()
    };

    // still inside the escrow's window
    let early = reclaim(harness.source.load_account(&user.source_key()).await.unwrap());
    assert!(harness.submit_source(early, &[&user.source]).await.is_err());

    harness.clock.advance(harness.service.config().claim_window_secs + 1);
    let late = reclaim(harness.source.load_account(&user.source_key()).await.unwrap());
    harness.submit_source(late, &[&user.source]).await.unwrap();

    let account = harness.source.load_account(&user.source_key()).await.unwrap();
    assert_eq!(account.balance_of(&custody.asset), amount);
    let err = harness.service.begin_mint(&user.user(), &etxa).await.unwrap_err();
    assert!(matches!(err, BridgeError::NoPendingBalance { .. }));
}

// ═══════════════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unsigned_lock_leaves_ledger_unchanged() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let user = harness.participant().await;
    harness
        .source
        .issue(&user.source_key(), &custody.asset, Decimal::from(10))
        .await
        .unwrap();
    let lock = harness
        .service
        .begin_lock(&custody.asset, Decimal::from(10), &user.user(), &user.mint_key())
        .await
        .unwrap();

    let before = harness.source.snapshot().await;
    let err = harness.submit_source(lock.transaction, &[]).await.unwrap_err();
    assert!(matches!(err, BridgeError::Ledger(LedgerError::Rejected { .. })));
    assert_eq!(harness.source.snapshot().await, before);
}

#[tokio::test]
async fn test_lock_submitted_through_fee_bump() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let user = harness.participant().await;
    let sponsor = harness.participant().await;
    harness
        .source
        .issue(&user.source_key(), &custody.asset, Decimal::from(10))
        .await
        .unwrap();
    let lock = harness
        .service
        .begin_lock(&custody.asset, Decimal::from(10), &user.user(), &user.mint_key())
        .await
        .unwrap();

    let passphrase = &harness.service.config().network_passphrase;
    let mut inner = lock.transaction;
    inner.sign(&user.source, passphrase).unwrap();
    let fee = inner.fee * 2;
    let mut bump = FeeBumpTransaction::new(sponsor.source_key(), fee, inner).unwrap();
    bump.sign(&sponsor.source, passphrase).unwrap();
    harness.source.submit_transaction(bump.into()).await.unwrap();

    let escrow = harness.service.load_escrow(&lock.etxa).await.unwrap();
    assert_eq!(escrow.state, EscrowState::SourceStarted);

    let starting = Decimal::from(ledger_sim::harness::PARTICIPANT_SOURCE_FUNDS);
    let user_account = harness.source.load_account(&user.source_key()).await.unwrap();
    assert_eq!(
        user_account.balance_of(&Asset::Native),
        starting - harness.service.config().escrow_starting_balance
    );
    let sponsor_account = harness.source.load_account(&sponsor.source_key()).await.unwrap();
    assert_eq!(sponsor_account.balance_of(&Asset::Native), starting - Decimal::new(i64::from(fee), 7));
}

#[tokio::test]
async fn test_begin_mint_intent_serializes() {
    let harness = harness().await;
    let custody = establish_custody(&harness, 1, "USDC").await.unwrap();
    let deposit = lock_and_commit(&harness, &custody, Decimal::from(3)).await.unwrap();

    let json = serde_json::to_string(&deposit.begin_mint).unwrap();
    let decoded: bridge_core::intents::BeginMintIntent = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, deposit.begin_mint);
    assert!(decoded.mint_transaction.signature_of(&decoded.controller).is_none());
}
