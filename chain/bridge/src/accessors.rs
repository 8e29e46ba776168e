//! Ledger accessors
//!
//! Rebuild vaults, mints and escrow accounts from ledger state. Each call
//! goes back to the ledgers, so two calls with no write in between return
//! identical snapshots.

use bridge_types::asset::Asset;
use bridge_types::controller::Controller;
use bridge_types::custody::{Mint, Validator, Vault};
use bridge_types::escrow::{
    EscrowState, STATE_KEY, TARGET_CHAIN_KEY, TARGET_TRANSACTION_ID_KEY, TARGET_WALLET_KEY,
    VAULT_KEY,
};
use bridge_types::ids::PublicKey;
use tracing::debug;

use crate::commitment::SignatureCommitment;
use crate::errors::BridgeError;
use crate::ledger::mint::MintLedger;
use crate::ledger::source::{ClaimableBalance, SourceAccount, SourceLedger};
use crate::service::BridgeService;
use crate::thresholds::{EscrowScheme, VaultScheme};

/// Decoded escrow transaction account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowAccount {
    pub id: PublicKey,
    pub target_chain: String,
    pub target_wallet: PublicKey,
    /// Vault chosen at lock time.
    pub vault: PublicKey,
    pub state: EscrowState,
    /// Present from `target_started` on.
    pub target_transaction_id: Option<SignatureCommitment>,
    pub depositor: PublicKey,
    /// Vault validators at lock time, in signer order.
    pub validators: Vec<PublicKey>,
    pub account: SourceAccount,
}

impl EscrowAccount {
    /// Decode `account`; `controller` is excluded from the validator signers.
    pub fn from_account(account: SourceAccount, controller: &PublicKey) -> Result<Self, BridgeError> {
        let id = account.id;
        let entry = |name: &str| {
            account
                .data_str(name)
                .map(str::to_string)
                .ok_or_else(|| BridgeError::MissingEscrowData {
                    escrow: id.to_string(),
                    entry: name.to_string(),
                })
        };

        let state = entry(STATE_KEY)?
            .parse::<EscrowState>()
            .map_err(|reason| BridgeError::MalformedData {
                field: STATE_KEY.to_string(),
                reason,
            })?;
        let target_chain = entry(TARGET_CHAIN_KEY)?;
        let target_wallet = entry(TARGET_WALLET_KEY)?
            .parse::<PublicKey>()
            .map_err(|e| BridgeError::MalformedData {
                field: TARGET_WALLET_KEY.to_string(),
                reason: e.to_string(),
            })?;
        let vault = entry(VAULT_KEY)?
            .parse::<PublicKey>()
            .map_err(|e| BridgeError::MalformedData {
                field: VAULT_KEY.to_string(),
                reason: e.to_string(),
            })?;
        let target_transaction_id = account
            .data_str(TARGET_TRANSACTION_ID_KEY)
            .map(str::parse::<SignatureCommitment>)
            .transpose()?;

        let depositor = match account.signers_with_weight(EscrowScheme::DEPOSITOR_WEIGHT).as_slice() {
            [depositor] => *depositor,
            other => {
                return Err(BridgeError::MalformedData {
                    field: "signers".to_string(),
                    reason: format!("expected one depositor signer, found {}", other.len()),
                })
            }
        };
        // with one validator the controller also holds weight two
        let validators = account
            .signers_with_weight(EscrowScheme::VALIDATOR_WEIGHT)
            .into_iter()
            .filter(|k| k != controller)
            .collect();

        Ok(Self {
            id,
            target_chain,
            target_wallet,
            vault,
            state,
            target_transaction_id,
            depositor,
            validators,
            account,
        })
    }

    /// Fails with `InvalidEscrowState` unless the escrow is in `expected`.
    pub fn require_state(&self, expected: EscrowState) -> Result<(), BridgeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BridgeError::InvalidEscrowState {
                escrow: self.id.to_string(),
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    pub fn commitment(&self) -> Result<SignatureCommitment, BridgeError> {
        self.target_transaction_id
            .ok_or_else(|| BridgeError::MissingEscrowData {
                escrow: self.id.to_string(),
                entry: TARGET_TRANSACTION_ID_KEY.to_string(),
            })
    }
}

impl<S, M> BridgeService<S, M>
where
    S: SourceLedger,
    M: MintLedger,
{
    /// Every vault the controller signs for.
    ///
    /// Escrow accounts are also signed by the controller; they are told
    /// apart by their `state` entry. Validators are the weight-one signers
    /// other than the controller.
    pub async fn existing_vaults(&self) -> Result<Vec<Vault>, BridgeError> {
        let controller = self.keys.source_controller_key();
        let accounts = self.source.accounts_for_signer(&controller).await?;

        let vaults: Vec<Vault> = accounts
            .into_iter()
            .filter(|a| a.id != controller && !a.data.contains_key(STATE_KEY))
            .map(|a| {
                let validators = a
                    .signers_with_weight(VaultScheme::VALIDATOR_WEIGHT)
                    .into_iter()
                    .filter(|k| *k != controller)
                    .map(Validator::source_only)
                    .collect();
                Vault::new(a.id, validators)
            })
            .collect();

        debug!(vaults = vaults.len(), "Loaded existing vaults");
        Ok(vaults)
    }

    /// Mint recorded for `asset` on the configuration account.
    ///
    /// When the mint authority is a multisig, its members other than the
    /// controller are the mint validators.
    pub async fn discover_mint(&self, asset: &Asset) -> Result<Mint, BridgeError> {
        let config = self.source.load_account(&self.keys.source_config_key()).await?;
        let attribute = Controller::mint_attribute_name(asset);
        let address = config
            .data_str(&attribute)
            .ok_or_else(|| BridgeError::MintNotRecorded {
                asset: asset.to_string(),
            })?
            .parse::<PublicKey>()
            .map_err(|e| BridgeError::MalformedData {
                field: attribute.clone(),
                reason: e.to_string(),
            })?;

        let info = self.mint.get_mint(&address).await?;
        let authority = info.mint_authority.ok_or_else(|| BridgeError::MalformedData {
            field: attribute,
            reason: "mint has no mint authority".to_string(),
        })?;

        let controller = self.keys.mint_controller_key();
        let validators = match self.mint.get_account_info(&authority).await? {
            Some(account) if account.is_multisig() => self
                .mint
                .get_multisig(&authority)
                .await?
                .members()
                .into_iter()
                .filter(|k| *k != controller)
                .map(Validator::mint_only)
                .collect(),
            _ => Vec::new(),
        };

        debug!(
            asset = %asset,
            mint = %address,
            authority = %authority,
            validators = validators.len(),
            "Discovered mint"
        );
        Ok(Mint::new(address, authority, validators))
    }

    pub async fn load_escrow(&self, etxa: &PublicKey) -> Result<EscrowAccount, BridgeError> {
        let account = self.source.load_account(etxa).await?;
        EscrowAccount::from_account(account, &self.keys.source_controller_key())
    }

    /// The deposit parked for `escrow`: claimable by the escrow account and
    /// created by its depositor.
    pub async fn pending_balance(&self, escrow: &EscrowAccount) -> Result<ClaimableBalance, BridgeError> {
        self.source
            .claimable_balances_for_claimant(&escrow.id)
            .await?
            .into_iter()
            .find(|b| b.sponsor == escrow.depositor && b.claimant(&escrow.id).is_some())
            .ok_or_else(|| BridgeError::NoPendingBalance {
                escrow: escrow.id.to_string(),
            })
    }
}
