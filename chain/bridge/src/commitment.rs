//! Signature commitment linking a lock to its mint
//!
//! When the mint transaction is built, the controller signs it once, hashes
//! the signature and records the hex digest on the escrow account. The raw
//! signature is wiped. Later a candidate mint transaction is accepted only
//! if the controller's deterministic signature over it hashes to the same
//! digest, and a release is accepted only if the finalized mint transaction
//! carries a signature with that digest.

use bridge_types::ids::SignatureBytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::BridgeError;

/// SHA-256 digest of one controller signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SignatureCommitment([u8; 32]);

impl SignatureCommitment {
    pub fn of(signature: &SignatureBytes) -> Self {
        Self(compute_hash(signature.as_bytes()))
    }

    /// Lowercase hex as stored in the `target_transaction_id` data entry.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn matches(&self, signature: &SignatureBytes) -> bool {
        Self::of(signature) == *self
    }

    /// Fails with `SignatureCommitmentMismatch` unless `signature` hashes to this commitment.
    pub fn verify(&self, signature: &SignatureBytes) -> Result<(), BridgeError> {
        let actual = Self::of(signature);
        if actual == *self {
            Ok(())
        } else {
            Err(BridgeError::SignatureCommitmentMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            })
        }
    }

    /// First of `signatures` that hashes to this commitment.
    pub fn find_in<'a>(
        &self,
        signatures: impl IntoIterator<Item = &'a SignatureBytes>,
    ) -> Option<&'a SignatureBytes> {
        signatures.into_iter().find(|s| self.matches(s))
    }
}

impl fmt::Display for SignatureCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for SignatureCommitment {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: String| BridgeError::MalformedData {
            field: "target_transaction_id".to_string(),
            reason,
        };
        let bytes = hex::decode(s).map_err(|e| malformed(e.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| malformed(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(digest))
    }
}

impl From<SignatureCommitment> for String {
    fn from(c: SignatureCommitment) -> Self {
        c.to_hex()
    }
}

impl TryFrom<String> for SignatureCommitment {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Compute a SHA-256 hash of arbitrary data.
pub fn compute_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
