//! Types library for the source-to-mint custody bridge
//!
//! Entity model shared by the protocol driver and the ledger simulator:
//! custody participants, the controller aggregate with its pluggable vault
//! selection, escrow-account vocabulary and custody errors.
//!
//! # Modules
//! - `ids`: Keys, signatures and transaction hashes (hex encoded)
//! - `asset`: Source Ledger assets
//! - `custody`: Validator, Vault, Mint, User
//! - `controller`: Controller aggregate and `VaultSelector` strategies
//! - `escrow`: Escrow account data entries and protocol states
//! - `errors`: Custody error taxonomy

pub mod ids;
pub mod asset;
pub mod custody;
pub mod controller;
pub mod escrow;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::asset::*;
    pub use crate::controller::*;
    pub use crate::custody::*;
    pub use crate::errors::*;
    pub use crate::escrow::*;
    pub use crate::ids::*;
}
