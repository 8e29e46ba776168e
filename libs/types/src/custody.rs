//! Custody entities: validators, vaults, mints and users
//!
//! These are value objects rebuilt from ledger state on every operation.
//! None of them is a source of truth on its own.

use crate::ids::PublicKey;
use serde::{Deserialize, Serialize};

/// A custody participant holding one key per ledger.
///
/// Either key may be unknown when only one side of the registration has been
/// observed, e.g. a vault signer read from the Source Ledger carries no mint
/// key and a multisig member read from the Mint Ledger carries no source key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    pub source_key: Option<PublicKey>,
    pub mint_key: Option<PublicKey>,
}

impl Validator {
    pub fn new(source_key: PublicKey, mint_key: PublicKey) -> Self {
        Self {
            source_key: Some(source_key),
            mint_key: Some(mint_key),
        }
    }

    /// Validator known only by its Source Ledger key.
    pub fn source_only(source_key: PublicKey) -> Self {
        Self {
            source_key: Some(source_key),
            mint_key: None,
        }
    }

    /// Validator known only by its Mint Ledger key.
    pub fn mint_only(mint_key: PublicKey) -> Self {
        Self {
            source_key: None,
            mint_key: Some(mint_key),
        }
    }
}

/// Weighted-multisig Source Ledger account shared by the controller and its validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub account_id: PublicKey,
    /// Registered validators in registration order.
    pub validators: Vec<Validator>,
}

impl Vault {
    pub fn new(account_id: PublicKey, validators: Vec<Validator>) -> Self {
        Self {
            account_id,
            validators,
        }
    }

    /// Whether a validator with this source key is a signer of the vault.
    pub fn has_validator(&self, source_key: &PublicKey) -> bool {
        self.validators
            .iter()
            .any(|v| v.source_key.as_ref() == Some(source_key))
    }

    /// Source keys of all validators, in order.
    pub fn validator_source_keys(&self) -> Vec<PublicKey> {
        self.validators.iter().filter_map(|v| v.source_key).collect()
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

/// Wrapped-asset mint on the Mint Ledger and the account holding its mint authority.
///
/// `authority` is the controller's own key until the first validator joins,
/// after which it is a multisig whose non-controller members are `validators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub mint_address: PublicKey,
    pub authority: PublicKey,
    pub validators: Vec<Validator>,
}

impl Mint {
    pub fn new(mint_address: PublicKey, authority: PublicKey, validators: Vec<Validator>) -> Self {
        Self {
            mint_address,
            authority,
            validators,
        }
    }

    /// Mint Ledger keys of the validators holding minting power.
    pub fn validator_mint_keys(&self) -> Vec<PublicKey> {
        self.validators.iter().filter_map(|v| v.mint_key).collect()
    }

    pub fn has_mint_signer(&self, mint_key: &PublicKey) -> bool {
        self.validators
            .iter()
            .any(|v| v.mint_key.as_ref() == Some(mint_key))
    }
}

/// Counterparty initiating a bridge operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub source_key: PublicKey,
    pub mint_key: PublicKey,
}

impl User {
    pub fn new(source_key: PublicKey, mint_key: PublicKey) -> Self {
        Self {
            source_key,
            mint_key,
        }
    }
}
