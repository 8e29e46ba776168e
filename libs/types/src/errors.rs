//! Error types for the custody entity model
//!
//! Raised by the controller's registration and selection rules before any
//! ledger transaction is built.

use thiserror::Error;

/// Custody rule violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CustodyError {
    /// No vault exists yet; the caller must bootstrap one instead.
    #[error("No vault exists: bootstrap a vault with its first validator")]
    NoVault,

    #[error("Validator not registered on any vault: {source_key}")]
    ValidatorNotRegistered { source_key: String },

    #[error("Validator already registered: {key}")]
    ValidatorAlreadyRegistered { key: String },

    #[error("Validator is missing its {ledger} ledger key")]
    IncompleteValidator { ledger: &'static str },

    #[error("Vault has no validators: {vault}")]
    VaultHasNoValidators { vault: String },

    /// The vault a deposit was locked into is no longer known.
    #[error("Unknown vault: {vault}")]
    UnknownVault { vault: String },

    #[error("Mint not managed by the controller: {mint}")]
    UnknownMint { mint: String },
}
