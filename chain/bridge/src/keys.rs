//! Controller key material
//!
//! The only private keys the core ever holds. Freshly generated account keys
//! (vaults, stake escrows, escrow accounts, multisigs, mints) sign once and
//! are dropped.

use bridge_types::ids::PublicKey;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::fmt;

pub struct ControllerKeys {
    /// Signs vaults and escrow accounts on the Source Ledger.
    pub source_controller: SigningKey,
    /// Owns the configuration account and every stake escrow.
    pub source_config: SigningKey,
    /// Mint authority member and mint creator on the Mint Ledger.
    pub mint_controller: SigningKey,
}

impl ControllerKeys {
    pub fn new(source_controller: SigningKey, source_config: SigningKey, mint_controller: SigningKey) -> Self {
        Self {
            source_controller,
            source_config,
            mint_controller,
        }
    }

    pub fn generate() -> Self {
        Self::new(fresh_keypair(), fresh_keypair(), fresh_keypair())
    }

    pub fn source_controller_key(&self) -> PublicKey {
        PublicKey::from(&self.source_controller)
    }

    pub fn source_config_key(&self) -> PublicKey {
        PublicKey::from(&self.source_config)
    }

    pub fn mint_controller_key(&self) -> PublicKey {
        PublicKey::from(&self.mint_controller)
    }
}

// Never print secret halves.
impl fmt::Debug for ControllerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerKeys")
            .field("source_controller", &self.source_controller_key())
            .field("source_config", &self.source_config_key())
            .field("mint_controller", &self.mint_controller_key())
            .finish()
    }
}

/// Random keypair for a one-shot account.
pub fn fresh_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_shows_public_keys_only() {
        let keys = ControllerKeys::generate();
        let secret = hex::encode(keys.source_controller.to_bytes());
        let debug = format!("{:?}", keys);
        assert!(debug.contains(&keys.source_controller_key().to_hex()));
        assert!(!debug.contains(&secret));
    }

    #[test]
    fn test_fresh_keypairs_differ() {
        assert_ne!(
            PublicKey::from(&fresh_keypair()),
            PublicKey::from(&fresh_keypair())
        );
    }
}
