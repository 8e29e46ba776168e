//! Escrow transaction account (ETxA) vocabulary
//!
//! The ETxA carries the protocol state of one bridge operation as data
//! entries on the Source Ledger. Names and values below are the on-ledger
//! encoding and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data entry naming the ledger the deposit is bridged to.
pub const TARGET_CHAIN_KEY: &str = "target_chain";
/// Data entry holding the recipient wallet on the Mint Ledger.
pub const TARGET_WALLET_KEY: &str = "target_wallet";
/// Data entry holding the protocol state.
pub const STATE_KEY: &str = "state";
/// Data entry holding the commitment hash of the mint transaction.
pub const TARGET_TRANSACTION_ID_KEY: &str = "target_transaction_id";
/// Data entry holding the vault chosen at lock time; the release pays into it.
pub const VAULT_KEY: &str = "vault";

/// Stored protocol state of an escrow account.
///
/// `target_committed` is never stored: it is verified on demand by
/// comparing a candidate mint transaction against the recorded commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    /// Escrow created, claimable balance posted.
    SourceStarted,
    /// Mint transaction built and its commitment recorded.
    TargetStarted,
    /// Pending balance claimed into the vault. Terminal.
    SourceReleased,
}

impl EscrowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::SourceStarted => "source_started",
            EscrowState::TargetStarted => "target_started",
            EscrowState::SourceReleased => "source_released",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::SourceReleased)
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_started" => Ok(EscrowState::SourceStarted),
            "target_started" => Ok(EscrowState::TargetStarted),
            "source_released" => Ok(EscrowState::SourceReleased),
            other => Err(format!("unknown escrow state: {}", other)),
        }
    }
}
