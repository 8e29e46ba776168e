//! Ledger collaborators
//!
//! The core talks to each ledger through an async trait and builds
//! transactions against the models defined here. Encoding, submission and
//! confirmation belong to the implementations.

pub mod mint;
pub mod source;

pub use crate::errors::LedgerError;
pub use mint::{MintLedger, MintTransaction};
pub use source::{SourceEnvelope, SourceLedger, SourceTransaction, SourceTransactionBuilder};
