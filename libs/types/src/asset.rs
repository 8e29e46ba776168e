//! Source Ledger assets
//!
//! A mint wraps exactly one asset. The native asset has no issuer and is
//! reported with the code `XLM`.

use crate::ids::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of decimal places the Source Ledger supports.
///
/// Mints on the Mint Ledger are created with this many decimals so that one
/// source unit maps onto `10^SOURCE_MAX_DECIMALS` mint units.
pub const SOURCE_MAX_DECIMALS: u8 = 7;

/// Code reported for the native asset.
pub const NATIVE_CODE: &str = "XLM";

/// An asset held on the Source Ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Native,
    Credit { code: String, issuer: PublicKey },
}

impl Asset {
    pub fn credit(code: impl Into<String>, issuer: PublicKey) -> Self {
        Asset::Credit {
            code: code.into(),
            issuer,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Asset code, `XLM` for the native asset.
    pub fn code(&self) -> &str {
        match self {
            Asset::Native => NATIVE_CODE,
            Asset::Credit { code, .. } => code,
        }
    }

    pub fn issuer(&self) -> Option<&PublicKey> {
        match self {
            Asset::Native => None,
            Asset::Credit { issuer, .. } => Some(issuer),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "{}", NATIVE_CODE),
            Asset::Credit { code, issuer } => write!(f, "{}:{}", code, issuer),
        }
    }
}
