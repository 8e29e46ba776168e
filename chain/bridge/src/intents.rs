//! Intents returned to callers
//!
//! An intent is a transaction for one ledger, signed by whatever the core
//! could sign, plus the public identifiers the caller needs to collect the
//! remaining signatures and submit it. The core never submits an intent.

use bridge_types::ids::{PublicKey, SignatureBytes, TransactionHash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commitment::SignatureCommitment;
use crate::ledger::mint::MintTransaction;
use crate::ledger::source::SourceTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultIntentKind {
    /// New vault with its first validator.
    Bootstrap,
    /// Validator joining an existing vault.
    AddValidator,
}

/// Registers a validator on a vault and creates its stake escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIntent {
    pub intent_id: Uuid,
    pub kind: VaultIntentKind,
    pub transaction: SourceTransaction,
    pub vault: PublicKey,
    pub validator_escrow: PublicKey,
    pub validator: PublicKey,
    pub controller: PublicKey,
    pub controller_config: PublicKey,
    /// Keys that still have to sign: the joining validator, plus one
    /// existing validator when the vault already had members.
    pub pending_signers: Vec<PublicKey>,
}

/// Hands the mint authority to a new multisig that includes the joining validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddValidatorToMintIntent {
    pub intent_id: Uuid,
    pub mint: PublicKey,
    pub validator: PublicKey,
    pub multisig: PublicKey,
    pub previous_authority: PublicKey,
    pub controller: PublicKey,
    pub transaction: MintTransaction,
    pub pending_signers: Vec<PublicKey>,
}

/// Creates the escrow account and parks the deposit in a claimable balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginLockIntent {
    pub intent_id: Uuid,
    pub transaction: SourceTransaction,
    pub controller: PublicKey,
    pub vault: PublicKey,
    pub etxa: PublicKey,
    pub pending_signers: Vec<PublicKey>,
}

/// Records the mint commitment on the escrow account and hands out the
/// mint transaction with the controller's signature removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginMintIntent {
    pub intent_id: Uuid,
    pub source_transaction: SourceTransaction,
    pub mint_transaction: MintTransaction,
    pub target_wallet: PublicKey,
    pub mint: PublicKey,
    pub mint_authority: PublicKey,
    pub controller: PublicKey,
    pub commitment: SignatureCommitment,
    /// Still required on the Source Ledger transaction.
    pub pending_signers: Vec<PublicKey>,
}

/// The verified mint transaction, now carrying the controller's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteMintIntent {
    pub intent_id: Uuid,
    pub target_wallet: PublicKey,
    pub mint_transaction: MintTransaction,
    pub controller: PublicKey,
    pub commitment: SignatureCommitment,
    pub pending_signers: Vec<PublicKey>,
}

/// Claims the deposit into the vault and closes out the escrow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteLockIntent {
    pub intent_id: Uuid,
    pub transaction: SourceTransaction,
    pub vault: PublicKey,
    pub etxa: PublicKey,
    pub controller: PublicKey,
    pub claimable_balance_id: String,
    pub pending_signers: Vec<PublicKey>,
}

/// Outcome of the one-time mint setup, which the core submits itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMintResult {
    pub source_transaction: TransactionHash,
    pub mint_transaction: SignatureBytes,
    pub mint_address: PublicKey,
}

pub(crate) fn new_intent_id() -> Uuid {
    Uuid::now_v7()
}
