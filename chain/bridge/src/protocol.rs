//! Lock/mint protocol driver
//!
//! Drives one bridge operation through the escrow account states:
//!
//! `source_started → target_started → (target_committed) → source_released`
//!
//! `target_committed` is never written: it holds when a candidate mint
//! transaction matches the commitment recorded at `target_started`. Each
//! step checks the stored state before building anything, so a replayed or
//! out-of-order call fails without side effects.

use bridge_types::asset::{Asset, SOURCE_MAX_DECIMALS};
use bridge_types::custody::{Mint, User};
use bridge_types::escrow::{
    EscrowState, STATE_KEY, TARGET_CHAIN_KEY, TARGET_TRANSACTION_ID_KEY, TARGET_WALLET_KEY,
    VAULT_KEY,
};
use bridge_types::ids::{PublicKey, SignatureBytes};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::commitment::SignatureCommitment;
use crate::errors::{BridgeError, LedgerError, TransactionError};
use crate::intents::{new_intent_id, BeginLockIntent, BeginMintIntent, CompleteLockIntent, CompleteMintIntent};
use crate::keys::fresh_keypair;
use crate::ledger::mint::{MintInstruction, MintLedger, MintTransaction};
use crate::ledger::source::{ClaimPredicate, Claimant, SourceLedger, SourceOperation, Thresholds};
use crate::service::BridgeService;
use crate::thresholds::EscrowScheme;

/// Mint Ledger units for a Source Ledger amount.
///
/// The amount must be positive, have at most `SOURCE_MAX_DECIMALS` decimal
/// places and fit a `u64` once scaled.
pub fn to_mint_units(amount: Decimal) -> Result<u64, BridgeError> {
    let invalid = |reason: &str| BridgeError::InvalidAmount {
        reason: format!("{}: {}", reason, amount),
    };
    if amount <= Decimal::ZERO {
        return Err(invalid("amount must be positive"));
    }
    if amount.normalize().scale() > u32::from(SOURCE_MAX_DECIMALS) {
        return Err(invalid("too many decimal places"));
    }
    amount
        .checked_mul(Decimal::from(10u64.pow(u32::from(SOURCE_MAX_DECIMALS))))
        .and_then(|units| units.to_u64())
        .ok_or_else(|| invalid("amount out of range"))
}

/// Minting needs the controller plus validators; a controller-only
/// authority is refused.
fn require_mint_validators(mint: &Mint) -> Result<(), BridgeError> {
    if mint.validators.is_empty() {
        return Err(BridgeError::MintHasNoValidators {
            mint: mint.mint_address.to_string(),
        });
    }
    Ok(())
}

impl<S, M> BridgeService<S, M>
where
    S: SourceLedger,
    M: MintLedger,
{
    /// Start a lock: create the escrow account and park `amount` of `asset`
    /// in a claimable balance the escrow can claim within the claim window
    /// and the depositor can reclaim after it.
    ///
    /// The depositor signs and submits the returned transaction.
    pub async fn begin_lock(
        &self,
        asset: &Asset,
        amount: Decimal,
        user: &User,
        target_wallet: &PublicKey,
    ) -> Result<BeginLockIntent, BridgeError> {
        to_mint_units(amount)?;
        let mint = self.discover_mint(asset).await?;
        require_mint_validators(&mint)?;
        let controller = self.load_controller(vec![mint]).await?;
        let vault = controller.select_vault_for_lock(asset, amount)?;
        let scheme = EscrowScheme::for_validator_count(vault.validator_count())?;

        let depositor = user.source_key;
        let etxa_key = fresh_keypair();
        let etxa = PublicKey::from(&etxa_key);
        let window = self.config.claim_window_secs;

        let mut operations = vec![
            SourceOperation::create_account(etxa, self.config.escrow_starting_balance).with_source(depositor),
        ];
        operations.extend(
            vault
                .validator_source_keys()
                .into_iter()
                .map(|v| SourceOperation::set_signer(v, scheme.validator_weight).with_source(etxa)),
        );
        operations.extend([
            SourceOperation::set_signer(self.keys.source_controller_key(), scheme.controller_weight).with_source(etxa),
            SourceOperation::set_signer(depositor, scheme.depositor_weight).with_source(etxa),
            SourceOperation::set_weights(0, Thresholds::uniform(scheme.threshold)).with_source(etxa),
            SourceOperation::create_claimable_balance(
                asset.clone(),
                amount,
                vec![
                    Claimant::new(etxa, ClaimPredicate::BeforeRelativeTime { seconds: window }),
                    Claimant::new(
                        depositor,
                        ClaimPredicate::not(ClaimPredicate::BeforeRelativeTime { seconds: window + 1 }),
                    ),
                ],
            )
            .with_source(depositor),
            SourceOperation::manage_data(TARGET_CHAIN_KEY, self.config.target_chain.as_bytes()).with_source(etxa),
            SourceOperation::manage_data(TARGET_WALLET_KEY, target_wallet.to_hex()).with_source(etxa),
            SourceOperation::manage_data(VAULT_KEY, vault.account_id.to_hex()).with_source(etxa),
            SourceOperation::manage_data(STATE_KEY, EscrowState::SourceStarted.as_str()).with_source(etxa),
        ]);

        let user_account = self.source.load_account(&depositor).await?;
        let mut tx = self.build_source_transaction(&user_account, operations).await?;
        tx.sign(&etxa_key, &self.config.network_passphrase)?;

        info!(
            asset = %asset,
            amount = %amount,
            vault = %vault.account_id,
            etxa = %etxa,
            depositor = %depositor,
            "Built begin-lock intent"
        );

        Ok(BeginLockIntent {
            intent_id: new_intent_id(),
            transaction: tx,
            controller: self.keys.source_controller_key(),
            vault: vault.account_id,
            etxa,
            pending_signers: vec![depositor],
        })
    }

    /// Build the mint transaction for a locked deposit and record the hash
    /// of the controller's signature on the escrow account.
    ///
    /// The controller's signature is removed from the returned mint
    /// transaction, so it cannot be completed before the commitment is on
    /// the Source Ledger.
    pub async fn begin_mint(&self, user: &User, etxa: &PublicKey) -> Result<BeginMintIntent, BridgeError> {
        let escrow = self.load_escrow(etxa).await?;
        escrow.require_state(EscrowState::SourceStarted)?;
        let balance = self.pending_balance(&escrow).await?;
        let units = to_mint_units(balance.amount)?;
        let mint = self.discover_mint(&balance.asset).await?;

        require_mint_validators(&mint)?;

        let controller_key = self.keys.mint_controller_key();
        let multisig_signers: Vec<PublicKey> = std::iter::once(controller_key)
            .chain(mint.validator_mint_keys())
            .collect();

        let blockhash = self.mint.latest_blockhash().await?;
        let mut mint_tx = MintTransaction::new(
            user.mint_key,
            blockhash,
            vec![MintInstruction::MintTo {
                mint: mint.mint_address,
                destination: escrow.target_wallet,
                authority: mint.authority,
                amount: units,
                multisig_signers,
            }],
        );

        let mut signature = mint_tx.partial_sign(&self.keys.mint_controller)?;
        let commitment = SignatureCommitment::of(&signature);
        signature.zeroize();
        mint_tx.clear_signature(&controller_key);

        let cosigner = escrow
            .validators
            .first()
            .copied()
            .ok_or_else(|| BridgeError::MalformedData {
                field: "signers".to_string(),
                reason: "escrow account has no validator signer".to_string(),
            })?;

        let operations = vec![
            SourceOperation::manage_data(TARGET_TRANSACTION_ID_KEY, commitment.to_hex()).with_source(escrow.id),
            SourceOperation::manage_data(STATE_KEY, EscrowState::TargetStarted.as_str()).with_source(escrow.id),
        ];
        let mut tx = self.build_source_transaction(&escrow.account, operations).await?;
        tx.sign(&self.keys.source_controller, &self.config.network_passphrase)?;

        info!(
            etxa = %escrow.id,
            mint = %mint.mint_address,
            units,
            commitment = %commitment,
            "Built begin-mint intent"
        );

        Ok(BeginMintIntent {
            intent_id: new_intent_id(),
            source_transaction: tx,
            mint_transaction: mint_tx,
            target_wallet: escrow.target_wallet,
            mint: mint.mint_address,
            mint_authority: mint.authority,
            controller: controller_key,
            commitment,
            pending_signers: vec![cosigner],
        })
    }

    /// Check `candidate` against the recorded commitment and, if it matches,
    /// return it carrying the controller's signature.
    ///
    /// Ed25519 signatures are deterministic, so re-signing an unmodified
    /// candidate reproduces the committed signature byte for byte.
    pub async fn complete_mint(
        &self,
        user: &User,
        etxa: &PublicKey,
        candidate: MintTransaction,
    ) -> Result<CompleteMintIntent, BridgeError> {
        let escrow = self.load_escrow(etxa).await?;
        escrow.require_state(EscrowState::TargetStarted)?;
        let commitment = escrow.commitment()?;

        let controller_key = self.keys.mint_controller_key();
        let mut tx = candidate;
        let signature = match tx.partial_sign(&self.keys.mint_controller) {
            Ok(signature) => signature,
            Err(TransactionError::NotASigner { key }) => {
                warn!(etxa = %escrow.id, user = %user.mint_key, "Mint transaction has no controller signer slot");
                return Err(BridgeError::SignatureCommitmentMismatch {
                    expected: commitment.to_hex(),
                    actual: format!("no signature from {}", key),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = commitment.verify(&signature) {
            tx.clear_signature(&controller_key);
            warn!(etxa = %escrow.id, user = %user.mint_key, "Mint transaction does not match commitment");
            return Err(e);
        }

        info!(etxa = %escrow.id, commitment = %commitment, "Mint transaction matches commitment");

        Ok(CompleteMintIntent {
            intent_id: new_intent_id(),
            target_wallet: escrow.target_wallet,
            pending_signers: tx.pending_signers(),
            mint_transaction: tx,
            controller: controller_key,
            commitment,
        })
    }

    /// Release the deposit into the vault recorded at lock time once the
    /// finalized mint transaction `mint_transaction_id` is shown to carry
    /// the committed signature.
    pub async fn complete_lock(
        &self,
        etxa: &PublicKey,
        mint_transaction_id: &SignatureBytes,
    ) -> Result<CompleteLockIntent, BridgeError> {
        let escrow = self.load_escrow(etxa).await?;
        escrow.require_state(EscrowState::TargetStarted)?;
        let commitment = escrow.commitment()?;

        let confirmed = self
            .mint
            .get_transaction(mint_transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                what: format!("mint transaction {}", mint_transaction_id),
            })?;
        if commitment.find_in(confirmed.signatures()).is_none() {
            warn!(etxa = %escrow.id, tx = %mint_transaction_id, "Finalized mint transaction does not match commitment");
            return Err(BridgeError::SignatureCommitmentMismatch {
                expected: commitment.to_hex(),
                actual: SignatureCommitment::of(mint_transaction_id).to_hex(),
            });
        }

        let balance = self.pending_balance(&escrow).await?;
        let controller = self.load_controller(Vec::new()).await?;
        let vault = controller.select_vault_for_release(&escrow.vault)?;

        let cosigner = escrow
            .validators
            .first()
            .copied()
            .ok_or_else(|| BridgeError::MalformedData {
                field: "signers".to_string(),
                reason: "escrow account has no validator signer".to_string(),
            })?;

        let operations = vec![
            SourceOperation::claim_claimable_balance(balance.id.clone()).with_source(escrow.id),
            SourceOperation::payment(vault.account_id, balance.asset.clone(), balance.amount).with_source(escrow.id),
            SourceOperation::manage_data(STATE_KEY, EscrowState::SourceReleased.as_str()).with_source(escrow.id),
        ];
        let mut tx = self.build_source_transaction(&escrow.account, operations).await?;
        tx.sign(&self.keys.source_controller, &self.config.network_passphrase)?;

        info!(
            etxa = %escrow.id,
            vault = %vault.account_id,
            asset = %balance.asset,
            amount = %balance.amount,
            balance_id = %balance.id,
            "Built complete-lock intent"
        );

        Ok(CompleteLockIntent {
            intent_id: new_intent_id(),
            transaction: tx,
            vault: vault.account_id,
            etxa: escrow.id,
            controller: self.keys.source_controller_key(),
            claimable_balance_id: balance.id,
            pending_signers: vec![cosigner],
        })
    }
}
