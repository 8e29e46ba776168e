//! Key and identifier types shared by both ledgers
//!
//! Both ledgers address accounts by 32-byte ed25519 public keys. Keys,
//! signatures and transaction hashes are rendered as lowercase hex in text
//! and in serde output so that intents stay readable on the wire.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// Error returned when parsing hex-encoded identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let bytes = hex::decode(s).map_err(|e| ParseIdError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseIdError::InvalidLength { expected: N, actual })
}

macro_rules! hex_id {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex encoding.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// Ed25519 public key identifying an account or a signer on either ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

hex_id!(PublicKey, 32);

impl PublicKey {
    /// Placeholder key filling unused multisig slots on the Mint Ledger.
    pub const SYSTEM: PublicKey = PublicKey([0u8; 32]);

    /// True for the all-zero placeholder key.
    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }

    /// Convert into a verifying key; fails for bytes that are not a curve point.
    pub fn to_verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl From<&SigningKey> for PublicKey {
    fn from(key: &SigningKey) -> Self {
        Self(key.verifying_key().to_bytes())
    }
}

/// Ed25519 signature bytes as carried inside ledger transactions.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureBytes([u8; 64]);

hex_id!(SignatureBytes, 64);

impl From<&Signature> for SignatureBytes {
    fn from(sig: &Signature) -> Self {
        Self(sig.to_bytes())
    }
}

impl SignatureBytes {
    /// Convert into a dalek signature for verification.
    pub fn to_signature(&self) -> Signature {
        Signature::from_bytes(&self.0)
    }
}

impl Zeroize for SignatureBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Hash identifying a Source Ledger transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionHash([u8; 32]);

hex_id!(TransactionHash, 32);

/// Recent block hash anchoring a Mint Ledger transaction's validity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blockhash([u8; 32]);

hex_id!(Blockhash, 32);
