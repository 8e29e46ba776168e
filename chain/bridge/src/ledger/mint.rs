//! Mint Ledger model
//!
//! A transaction lists its signer slots up front (fee payer first) and
//! collects signatures over one message incrementally, so several parties
//! can sign the same transaction in turn. The fee payer's signature is the
//! transaction id.

use async_trait::async_trait;
use bridge_types::ids::{Blockhash, PublicKey, SignatureBytes};
use ed25519_dalek::{Signer as _, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::{LedgerError, TransactionError};

/// Byte size of a mint account.
pub const MINT_SIZE: usize = 82;

/// Byte size of a multisig account.
pub const MULTISIG_SIZE: usize = 355;

/// Maximum members of a multisig account.
pub const MAX_MULTISIG_SIGNERS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountOwner {
    System,
    TokenProgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
    MintTokens,
    FreezeAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MintInstruction {
    CreateAccount {
        funder: PublicKey,
        new_account: PublicKey,
        lamports: u64,
        space: usize,
        owner: AccountOwner,
    },
    InitializeMint {
        mint: PublicKey,
        decimals: u8,
        mint_authority: PublicKey,
        freeze_authority: Option<PublicKey>,
    },
    InitializeMultisig {
        multisig: PublicKey,
        signers: Vec<PublicKey>,
        threshold: u8,
    },
    SetAuthority {
        account: PublicKey,
        authority_type: AuthorityType,
        new_authority: Option<PublicKey>,
        current_authority: PublicKey,
        /// Members signing for `current_authority` when it is a multisig.
        multisig_signers: Vec<PublicKey>,
    },
    MintTo {
        mint: PublicKey,
        destination: PublicKey,
        authority: PublicKey,
        amount: u64,
        /// Members signing for `authority` when it is a multisig.
        multisig_signers: Vec<PublicKey>,
    },
}

impl MintInstruction {
    /// Keys that must sign a transaction carrying this instruction.
    pub fn required_signers(&self) -> Vec<PublicKey> {
        match self {
            MintInstruction::CreateAccount {
                funder, new_account, ..
            } => vec![*funder, *new_account],
            MintInstruction::InitializeMint { .. } | MintInstruction::InitializeMultisig { .. } => {
                Vec::new()
            }
            MintInstruction::SetAuthority {
                current_authority,
                multisig_signers,
                ..
            } => authority_signers(current_authority, multisig_signers),
            MintInstruction::MintTo {
                authority,
                multisig_signers,
                ..
            } => authority_signers(authority, multisig_signers),
        }
    }
}

fn authority_signers(authority: &PublicKey, multisig_signers: &[PublicKey]) -> Vec<PublicKey> {
    if multisig_signers.is_empty() {
        vec![*authority]
    } else {
        multisig_signers.to_vec()
    }
}

// ───────────────────────── Transactions ─────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSlot {
    pub signer: PublicKey,
    pub signature: Option<SignatureBytes>,
}

#[derive(Serialize)]
struct Message<'a> {
    fee_payer: &'a PublicKey,
    recent_blockhash: &'a Blockhash,
    instructions: &'a [MintInstruction],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintTransaction {
    pub fee_payer: PublicKey,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<MintInstruction>,
    pub signatures: Vec<SignatureSlot>,
}

impl MintTransaction {
    /// Unsigned transaction with one slot per distinct required signer.
    pub fn new(fee_payer: PublicKey, recent_blockhash: Blockhash, instructions: Vec<MintInstruction>) -> Self {
        let mut signers = vec![fee_payer];
        for key in instructions.iter().flat_map(MintInstruction::required_signers) {
            if !signers.contains(&key) {
                signers.push(key);
            }
        }
        Self {
            fee_payer,
            recent_blockhash,
            instructions,
            signatures: signers
                .into_iter()
                .map(|signer| SignatureSlot {
                    signer,
                    signature: None,
                })
                .collect(),
        }
    }

    /// Bytes every signer signs.
    pub fn message_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        let message = Message {
            fee_payer: &self.fee_payer,
            recent_blockhash: &self.recent_blockhash,
            instructions: &self.instructions,
        };
        serde_json::to_vec(&message).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    /// Fill the slot of `key`, leaving other slots untouched.
    pub fn partial_sign(&mut self, key: &SigningKey) -> Result<SignatureBytes, TransactionError> {
        let signer = PublicKey::from(key);
        let message = self.message_bytes()?;
        let slot = self.slot_mut(&signer)?;
        let signature = SignatureBytes::from(&key.sign(&message));
        slot.signature = Some(signature);
        Ok(signature)
    }

    /// Attach a signature produced elsewhere.
    pub fn add_signature(&mut self, signer: &PublicKey, signature: SignatureBytes) -> Result<(), TransactionError> {
        self.slot_mut(signer)?.signature = Some(signature);
        Ok(())
    }

    pub fn signature_of(&self, signer: &PublicKey) -> Option<&SignatureBytes> {
        self.signatures
            .iter()
            .find(|s| s.signer == *signer)
            .and_then(|s| s.signature.as_ref())
    }

    /// Wipe and remove the signature of `signer`.
    pub fn clear_signature(&mut self, signer: &PublicKey) {
        if let Some(slot) = self.signatures.iter_mut().find(|s| s.signer == *signer) {
            if let Some(sig) = slot.signature.as_mut() {
                sig.zeroize();
            }
            slot.signature = None;
        }
    }

    pub fn signers(&self) -> Vec<PublicKey> {
        self.signatures.iter().map(|s| s.signer).collect()
    }

    /// Slots still waiting for a signature.
    pub fn pending_signers(&self) -> Vec<PublicKey> {
        self.signatures
            .iter()
            .filter(|s| s.signature.is_none())
            .map(|s| s.signer)
            .collect()
    }

    pub fn present_signatures(&self) -> impl Iterator<Item = &SignatureBytes> {
        self.signatures.iter().filter_map(|s| s.signature.as_ref())
    }

    /// True when every slot carries a valid signature.
    pub fn verify_signatures(&self) -> bool {
        let Ok(message) = self.message_bytes() else {
            return false;
        };
        self.signatures.iter().all(|slot| match (&slot.signature, slot.signer.to_verifying_key()) {
            (Some(sig), Some(vk)) => vk.verify(&message, &sig.to_signature()).is_ok(),
            _ => false,
        })
    }

    /// The fee payer's signature, once present.
    pub fn id(&self) -> Option<SignatureBytes> {
        self.signature_of(&self.fee_payer).copied()
    }

    fn slot_mut(&mut self, signer: &PublicKey) -> Result<&mut SignatureSlot, TransactionError> {
        self.signatures
            .iter_mut()
            .find(|s| s.signer == *signer)
            .ok_or_else(|| TransactionError::NotASigner {
                key: signer.to_string(),
            })
    }
}

// ───────────────────────── Ledger views ─────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    pub address: PublicKey,
    pub mint_authority: Option<PublicKey>,
    pub freeze_authority: Option<PublicKey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: PublicKey,
    pub owner: AccountOwner,
    pub lamports: u64,
    pub data_len: usize,
}

impl AccountInfo {
    pub fn is_multisig(&self) -> bool {
        self.owner == AccountOwner::TokenProgram && self.data_len == MULTISIG_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigInfo {
    pub address: PublicKey,
    pub threshold: u8,
    /// Always `MAX_MULTISIG_SIGNERS` entries; unused slots hold `PublicKey::SYSTEM`.
    pub signers: Vec<PublicKey>,
    pub is_initialized: bool,
}

impl MultisigInfo {
    /// Members with placeholder slots skipped.
    pub fn members(&self) -> Vec<PublicKey> {
        self.signers.iter().filter(|k| !k.is_system()).copied().collect()
    }
}

/// A finalized transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub slot: u64,
    pub transaction: MintTransaction,
}

impl ConfirmedTransaction {
    pub fn signatures(&self) -> impl Iterator<Item = &SignatureBytes> {
        self.transaction.present_signatures()
    }
}

// ───────────────────────── Collaborator ─────────────────────────

/// Read and submit access to the Mint Ledger.
#[async_trait]
pub trait MintLedger: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, LedgerError>;

    async fn get_mint(&self, address: &PublicKey) -> Result<MintInfo, LedgerError>;

    async fn get_account_info(&self, address: &PublicKey) -> Result<Option<AccountInfo>, LedgerError>;

    async fn get_multisig(&self, address: &PublicKey) -> Result<MultisigInfo, LedgerError>;

    /// Finalized transaction by id, `None` while unknown or unconfirmed.
    async fn get_transaction(&self, id: &SignatureBytes) -> Result<Option<ConfirmedTransaction>, LedgerError>;

    async fn send_transaction(&self, transaction: MintTransaction) -> Result<SignatureBytes, LedgerError>;
}
