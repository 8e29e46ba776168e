//! Lock/mint orchestration for the source-to-mint bridge
//!
//! This crate builds the transactions that lock an asset on the Source
//! Ledger under shared custody and mint its wrapped form on the Mint Ledger,
//! linking the two through a signature commitment.
//!
//! # Modules
//! - `errors`: Ledger, transaction and bridge error types
//! - `ledger`: Collaborator traits and transaction models for both ledgers
//! - `thresholds`: Weighted signer schemes for vaults, escrows and the mint authority
//! - `commitment`: Signature commitment recorded on escrow accounts
//! - `config`: Bridge configuration
//! - `keys`: Controller key material
//! - `intents`: Partially signed transactions handed back to callers
//! - `service`: `BridgeService`, the entry point
//! - `accessors`: Custody state rebuilt from the ledgers
//! - `registrar`: Vault, validator and mint registration
//! - `protocol`: Lock/mint state machine

pub mod errors;
pub mod ledger;
pub mod thresholds;
pub mod commitment;
pub mod config;
pub mod keys;
pub mod intents;
pub mod service;
pub mod accessors;
pub mod registrar;
pub mod protocol;

pub use accessors::EscrowAccount;
pub use config::BridgeConfig;
pub use errors::{BridgeError, LedgerError, TransactionError};
pub use keys::ControllerKeys;
pub use service::BridgeService;
