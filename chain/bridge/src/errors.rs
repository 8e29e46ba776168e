//! Bridge error types
//!
//! Error taxonomy for ledger collaborators, transaction assembly and the
//! lock/mint protocol. Custody rule violations from the entity model are
//! wrapped rather than re-declared.

use bridge_types::errors::CustodyError;
use thiserror::Error;

/// Failures reported by a ledger collaborator.
///
/// The core never retries these; retry and backoff belong to the
/// collaborator layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Account not found: {account}")]
    AccountNotFound { account: String },

    #[error("Ledger object not found: {what}")]
    NotFound { what: String },

    #[error("Transaction rejected: {reason}")]
    Rejected { reason: String },

    #[error("Ledger unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Failures while assembling or signing a transaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Transaction has no operations")]
    Empty,

    #[error("Key is not a required signer: {key}")]
    NotASigner { key: String },

    #[error("Fee overflow: base fee {base_fee} for {operations} operations")]
    FeeOverflow { base_fee: u32, operations: usize },

    #[error("Fee bump fee {fee} below inner transaction fee {inner_fee}")]
    FeeBumpTooLow { fee: u32, inner_fee: u32 },

    #[error("Failed to encode transaction: {0}")]
    Encoding(String),
}

/// Top-level bridge error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// The candidate mint transaction does not carry the committed signature.
    #[error("Signature commitment mismatch: expected {expected}, got {actual}")]
    SignatureCommitmentMismatch { expected: String, actual: String },

    #[error("Mint already recorded for {asset}: {existing}")]
    MintAlreadyRecorded { asset: String, existing: String },

    #[error("No mint recorded for {asset}")]
    MintNotRecorded { asset: String },

    /// The mint authority is still the controller alone.
    #[error("Mint {mint} has no validators on its authority")]
    MintHasNoValidators { mint: String },

    #[error("Escrow {escrow} is in state {actual}, expected {expected}")]
    InvalidEscrowState {
        escrow: String,
        expected: String,
        actual: String,
    },

    #[error("Escrow {escrow} is missing data entry {entry}")]
    MissingEscrowData { escrow: String, entry: String },

    #[error("No pending claimable balance for escrow {escrow}")]
    NoPendingBalance { escrow: String },

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Multisig capacity exceeded: {members} members, maximum {max}")]
    MultisigCapacityExceeded { members: usize, max: usize },

    #[error("Signer weight overflow for {validators} validators")]
    WeightOverflow { validators: usize },

    #[error("Malformed ledger data in {field}: {reason}")]
    MalformedData { field: String, reason: String },
}
