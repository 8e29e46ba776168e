//! Vault and validator registration
//!
//! Builds the intents that grow the custody set:
//! - bootstrap a vault with its first validator
//! - add a validator to an existing vault, re-deriving the vault weights
//! - hand the mint authority to a multisig that includes a new validator
//! - create the mint for an asset (the only operation the core submits)
//!
//! Every validator also gets a stake escrow that only the controller-config
//! key can spend.

use bridge_types::asset::{Asset, SOURCE_MAX_DECIMALS};
use bridge_types::controller::Controller;
use bridge_types::custody::{Validator, Vault};
use bridge_types::errors::CustodyError;
use bridge_types::ids::PublicKey;
use ed25519_dalek::SigningKey;
use tracing::{info, warn};

use crate::errors::BridgeError;
use crate::intents::{new_intent_id, AddValidatorToMintIntent, CreateMintResult, VaultIntent, VaultIntentKind};
use crate::keys::fresh_keypair;
use crate::ledger::mint::{AccountOwner, AuthorityType, MintInstruction, MintLedger, MintTransaction, MINT_SIZE, MULTISIG_SIZE};
use crate::ledger::source::{SourceEnvelope, SourceLedger, SourceOperation, Thresholds};
use crate::service::BridgeService;
use crate::thresholds::{MintAuthorityScheme, StakeScheme, VaultScheme};

fn source_key_of(validator: &Validator) -> Result<PublicKey, CustodyError> {
    validator
        .source_key
        .ok_or(CustodyError::IncompleteValidator { ledger: "source" })
}

impl<S, M> BridgeService<S, M>
where
    S: SourceLedger,
    M: MintLedger,
{
    /// Stake escrow funded by `validator` and spendable by the config key alone.
    fn stake_escrow_operations(&self, escrow: PublicKey, validator: PublicKey) -> Vec<SourceOperation> {
        vec![
            SourceOperation::create_account(escrow, self.config.validator_staking_amount).with_source(validator),
            SourceOperation::set_signer(self.keys.source_config_key(), StakeScheme::CONFIG_WEIGHT).with_source(escrow),
            SourceOperation::set_signer(validator, StakeScheme::VALIDATOR_WEIGHT).with_source(escrow),
            SourceOperation::set_weights(0, Thresholds::uniform(StakeScheme::THRESHOLD)).with_source(escrow),
        ]
    }

    /// Signer updates putting `vault` on `scheme`, with `validator` joining.
    fn vault_weight_operations(&self, vault: PublicKey, validator: PublicKey, scheme: &VaultScheme) -> Vec<SourceOperation> {
        vec![
            SourceOperation::set_signer(self.keys.source_controller_key(), scheme.controller_weight).with_source(vault),
            SourceOperation::set_signer(validator, scheme.validator_weight).with_source(vault),
            SourceOperation::set_weights(0, Thresholds::uniform(scheme.threshold)).with_source(vault),
        ]
    }

    /// Create a vault whose only validator is `validator` (2-of-2 with the controller).
    ///
    /// Signed by the fresh vault and stake escrow keys and by the config key;
    /// the validator still has to sign for the accounts it funds.
    pub async fn bootstrap_vault_intent(&self, validator: &Validator) -> Result<VaultIntent, BridgeError> {
        let validator_key = source_key_of(validator)?;
        let scheme = VaultScheme::for_validator_count(1)?;

        let vault_key = fresh_keypair();
        let escrow_key = fresh_keypair();
        let vault = PublicKey::from(&vault_key);
        let escrow = PublicKey::from(&escrow_key);

        let mut operations = self.stake_escrow_operations(escrow, validator_key);
        operations.push(
            SourceOperation::create_account(vault, self.config.vault_starting_balance).with_source(validator_key),
        );
        operations.extend(self.vault_weight_operations(vault, validator_key, &scheme));

        let config_account = self.source.load_account(&self.keys.source_config_key()).await?;
        let mut tx = self.build_source_transaction(&config_account, operations).await?;
        let passphrase = &self.config.network_passphrase;
        tx.sign(&vault_key, passphrase)?;
        tx.sign(&escrow_key, passphrase)?;
        tx.sign(&self.keys.source_config, passphrase)?;

        info!(
            vault = %vault,
            validator = %validator_key,
            validator_escrow = %escrow,
            "Built vault bootstrap intent"
        );

        Ok(VaultIntent {
            intent_id: new_intent_id(),
            kind: VaultIntentKind::Bootstrap,
            transaction: tx,
            vault,
            validator_escrow: escrow,
            validator: validator_key,
            controller: self.keys.source_controller_key(),
            controller_config: self.keys.source_config_key(),
            pending_signers: vec![validator_key],
        })
    }

    /// Add `validator` to the selected vault and re-derive the vault weights
    /// for the new validator count.
    ///
    /// Fails with `CustodyError::NoVault` when there is no vault yet.
    pub async fn add_validator_intent(&self, validator: &Validator) -> Result<VaultIntent, BridgeError> {
        let mut controller = self.load_controller(Vec::new()).await?;
        let vault: Vault = controller.register_validator_to_vault(validator.clone())?.clone();
        let validator_key = source_key_of(validator)?;
        let scheme = VaultScheme::for_validator_count(vault.validator_count())?;

        let existing_signer = vault
            .validator_source_keys()
            .into_iter()
            .find(|k| *k != validator_key)
            .ok_or_else(|| CustodyError::VaultHasNoValidators {
                vault: vault.account_id.to_string(),
            })?;

        let escrow_key = fresh_keypair();
        let escrow = PublicKey::from(&escrow_key);

        let mut operations = self.stake_escrow_operations(escrow, validator_key);
        operations.push(
            SourceOperation::payment(vault.account_id, Asset::Native, self.config.vault_top_up_amount)
                .with_source(validator_key),
        );
        operations.extend(self.vault_weight_operations(vault.account_id, validator_key, &scheme));

        let config_account = self.source.load_account(&self.keys.source_config_key()).await?;
        let mut tx = self.build_source_transaction(&config_account, operations).await?;
        let passphrase = &self.config.network_passphrase;
        tx.sign(&escrow_key, passphrase)?;
        tx.sign(&self.keys.source_config, passphrase)?;
        tx.sign(&self.keys.source_controller, passphrase)?;

        info!(
            vault = %vault.account_id,
            validator = %validator_key,
            validators = scheme.validator_count,
            controller_weight = scheme.controller_weight,
            threshold = scheme.threshold,
            "Built add-validator intent"
        );

        Ok(VaultIntent {
            intent_id: new_intent_id(),
            kind: VaultIntentKind::AddValidator,
            transaction: tx,
            vault: vault.account_id,
            validator_escrow: escrow,
            validator: validator_key,
            controller: self.keys.source_controller_key(),
            controller_config: self.keys.source_config_key(),
            pending_signers: vec![validator_key, existing_signer],
        })
    }

    /// Join an existing vault, or bootstrap the first one.
    pub async fn register_validator_intent(&self, validator: &Validator) -> Result<VaultIntent, BridgeError> {
        match self.add_validator_intent(validator).await {
            Err(BridgeError::Custody(CustodyError::NoVault)) => {
                info!("No vault yet, bootstrapping");
                self.bootstrap_vault_intent(validator).await
            }
            other => other,
        }
    }

    /// Replace the mint authority of `asset`'s mint with a new multisig
    /// holding the controller, the known mint validators and `validator`.
    ///
    /// The validator must already sign for a vault. It pays the fee and
    /// signs externally, as do the known validators when the current
    /// authority is a multisig.
    pub async fn add_validator_to_mint_intent(
        &self,
        validator: &Validator,
        asset: &Asset,
    ) -> Result<AddValidatorToMintIntent, BridgeError> {
        let mint = self.discover_mint(asset).await?;
        let controller = self.load_controller(vec![mint.clone()]).await?;
        controller.register_validator_to_mint(validator, &mint)?;
        let validator_key = validator
            .mint_key
            .ok_or(CustodyError::IncompleteValidator { ledger: "mint" })?;

        let controller_key = self.keys.mint_controller_key();
        let known = mint.validator_mint_keys();
        let joined: Vec<PublicKey> = known.iter().copied().chain(std::iter::once(validator_key)).collect();
        let scheme = MintAuthorityScheme::for_members(controller_key, &joined)?;

        // a lone controller authority signs directly
        let current_signers = if mint.authority == controller_key {
            Vec::new()
        } else {
            std::iter::once(controller_key).chain(known.iter().copied()).collect()
        };

        let multisig_key = fresh_keypair();
        let multisig = PublicKey::from(&multisig_key);
        let lamports = self.mint.minimum_balance_for_rent_exemption(MULTISIG_SIZE).await?;
        let blockhash = self.mint.latest_blockhash().await?;

        let mut tx = MintTransaction::new(
            validator_key,
            blockhash,
            vec![
                MintInstruction::CreateAccount {
                    funder: validator_key,
                    new_account: multisig,
                    lamports,
                    space: MULTISIG_SIZE,
                    owner: AccountOwner::TokenProgram,
                },
                MintInstruction::InitializeMultisig {
                    multisig,
                    signers: scheme.members.clone(),
                    threshold: scheme.threshold,
                },
                MintInstruction::SetAuthority {
                    account: mint.mint_address,
                    authority_type: AuthorityType::MintTokens,
                    new_authority: Some(multisig),
                    current_authority: mint.authority,
                    multisig_signers: current_signers,
                },
            ],
        );
        tx.partial_sign(&self.keys.mint_controller)?;
        tx.partial_sign(&multisig_key)?;

        info!(
            mint = %mint.mint_address,
            validator = %validator_key,
            multisig = %multisig,
            members = scheme.members.len(),
            threshold = scheme.threshold,
            "Built add-validator-to-mint intent"
        );

        Ok(AddValidatorToMintIntent {
            intent_id: new_intent_id(),
            mint: mint.mint_address,
            validator: validator_key,
            multisig,
            previous_authority: mint.authority,
            controller: controller_key,
            pending_signers: tx.pending_signers(),
            transaction: tx,
        })
    }

    /// Create the mint wrapping `asset` and record it on the config account.
    ///
    /// Fails with `MintAlreadyRecorded` before touching the Mint Ledger when
    /// a mint is already recorded. If the Source Ledger write fails after the
    /// mint was created, the mint is orphaned and a retry creates a new one.
    pub async fn create_mint(&self, asset: &Asset) -> Result<CreateMintResult, BridgeError> {
        let config_account = self.source.load_account(&self.keys.source_config_key()).await?;
        let attribute = Controller::mint_attribute_name(asset);
        if let Some(existing) = config_account.data_str(&attribute) {
            return Err(BridgeError::MintAlreadyRecorded {
                asset: asset.to_string(),
                existing: existing.to_string(),
            });
        }

        let controller_key = self.keys.mint_controller_key();
        let mint_key: SigningKey = fresh_keypair();
        let mint_address = PublicKey::from(&mint_key);
        let lamports = self.mint.minimum_balance_for_rent_exemption(MINT_SIZE).await?;
        let blockhash = self.mint.latest_blockhash().await?;

        let mut mint_tx = MintTransaction::new(
            controller_key,
            blockhash,
            vec![
                MintInstruction::CreateAccount {
                    funder: controller_key,
                    new_account: mint_address,
                    lamports,
                    space: MINT_SIZE,
                    owner: AccountOwner::TokenProgram,
                },
                MintInstruction::InitializeMint {
                    mint: mint_address,
                    decimals: SOURCE_MAX_DECIMALS,
                    mint_authority: controller_key,
                    freeze_authority: None,
                },
            ],
        );
        mint_tx.partial_sign(&self.keys.mint_controller)?;
        mint_tx.partial_sign(&mint_key)?;
        let mint_transaction = self.mint.send_transaction(mint_tx).await?;
        info!(asset = %asset, mint = %mint_address, "Created mint");

        let operations = vec![SourceOperation::manage_data(attribute, mint_address.to_hex())];
        let mut tx = self.build_source_transaction(&config_account, operations).await?;
        tx.sign(&self.keys.source_config, &self.config.network_passphrase)?;
        let source_transaction = self
            .source
            .submit_transaction(SourceEnvelope::from(tx))
            .await
            .inspect_err(|e| warn!(asset = %asset, mint = %mint_address, error = %e, "Mint created but not recorded"))?;

        info!(asset = %asset, mint = %mint_address, tx = %source_transaction, "Recorded mint");

        Ok(CreateMintResult {
            source_transaction,
            mint_transaction,
            mint_address,
        })
    }
}
