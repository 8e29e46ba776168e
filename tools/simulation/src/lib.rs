//! Ledger simulation for the source-to-mint bridge
//!
//! In-memory implementations of both ledger collaborators and a harness
//! that plays validators and users, so the full lock/mint protocol can run
//! end to end without a network.
//!
//! # Modules
//! - `clock`: Shared ledger clock, advanced by hand
//! - `source_ledger`: Accounts, weighted signers, claimable balances
//! - `mint_ledger`: Mints, multisig authorities, token balances
//! - `harness`: `BridgeService` wired to both ledgers, plus external parties
//! - `scenarios`: Custody set-up and the lock/mint round trip

pub mod clock;
pub mod source_ledger;
pub mod mint_ledger;
pub mod harness;
pub mod scenarios;
