//! Bridge configuration
//!
//! Supplied by the embedder; the core never reads files or the environment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amounts are in units of the Source Ledger native asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Mixed into every Source Ledger signature so that transactions are network-bound.
    pub network_passphrase: String,
    /// Value of the `target_chain` entry written on every escrow account.
    pub target_chain: String,
    /// Stake a validator locks into its stake escrow on registration.
    pub validator_staking_amount: Decimal,
    /// Starting balance of a bootstrapped vault, paid by its first validator.
    pub vault_starting_balance: Decimal,
    /// Paid into the vault by every validator joining later.
    pub vault_top_up_amount: Decimal,
    /// Starting balance of an escrow account, paid by the depositor.
    pub escrow_starting_balance: Decimal,
    /// How long the escrow account may claim the deposit. The depositor can
    /// reclaim it one second after the window closes.
    pub claim_window_secs: i64,
    /// Validity window of every Source Ledger transaction.
    pub tx_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            network_passphrase: "Test SDF Network ; September 2015".to_string(),
            target_chain: "solana".to_string(),
            validator_staking_amount: Decimal::from(10),
            vault_starting_balance: Decimal::from(2),
            vault_top_up_amount: Decimal::new(5, 1),
            escrow_starting_balance: Decimal::from(10),
            claim_window_secs: 300,
            tx_timeout_secs: 30,
        }
    }
}
