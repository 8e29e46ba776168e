//! Controller aggregate and vault selection
//!
//! The controller is rebuilt from ledger state for every operation. It owns
//! the registration rules (vault membership before mint membership) and
//! delegates the choice of vault to a pluggable [`VaultSelector`].

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

use crate::asset::Asset;
use crate::custody::{Mint, Validator, Vault};
use crate::errors::CustodyError;
use crate::ids::PublicKey;

/// Strategy choosing which vault serves an operation.
///
/// Implementations return an index into `vaults`, or `None` when no vault
/// is eligible. Callers never index vaults directly.
pub trait VaultSelector: Send + Sync {
    /// Vault receiving a newly registered validator.
    fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize>;

    /// Vault custodying a new deposit of `amount` of `asset`.
    fn select_for_lock(&self, vaults: &[Vault], asset: &Asset, amount: Decimal) -> Option<usize>;

    /// Vault receiving a deposit locked into `locked`. Defaults to `locked`
    /// itself.
    fn select_for_release(&self, vaults: &[Vault], locked: &PublicKey) -> Option<usize> {
        vaults.iter().position(|v| v.account_id == *locked)
    }
}

/// Always picks the first known vault.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstVault;

impl VaultSelector for FirstVault {
    fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize> {
        (!vaults.is_empty()).then_some(0)
    }

    fn select_for_lock(&self, vaults: &[Vault], _asset: &Asset, _amount: Decimal) -> Option<usize> {
        (!vaults.is_empty()).then_some(0)
    }
}

/// Per-operation view of the custody structure.
#[derive(Clone)]
pub struct Controller {
    vaults: Vec<Vault>,
    mints: Vec<Mint>,
    selector: Arc<dyn VaultSelector>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("vaults", &self.vaults)
            .field("mints", &self.mints)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Controller using the [`FirstVault`] strategy.
    pub fn new(vaults: Vec<Vault>, mints: Vec<Mint>) -> Self {
        Self::with_selector(vaults, mints, Arc::new(FirstVault))
    }

    pub fn with_selector(vaults: Vec<Vault>, mints: Vec<Mint>, selector: Arc<dyn VaultSelector>) -> Self {
        Self {
            vaults,
            mints,
            selector,
        }
    }

    /// Name of the configuration-account data entry recording the mint of `asset`.
    pub fn mint_attribute_name(asset: &Asset) -> String {
        format!("w{}_mint", asset.code())
    }

    pub fn vaults(&self) -> &[Vault] {
        &self.vaults
    }

    pub fn mints(&self) -> &[Mint] {
        &self.mints
    }

    /// Append `validator` to the selected vault.
    ///
    /// Fails with [`CustodyError::NoVault`] when there is nothing to join;
    /// the caller is expected to bootstrap a vault in that case.
    pub fn register_validator_to_vault(&mut self, validator: Validator) -> Result<&Vault, CustodyError> {
        let source_key = validator
            .source_key
            .ok_or(CustodyError::IncompleteValidator { ledger: "source" })?;

        let index = self
            .selector
            .select_for_registration(&self.vaults)
            .ok_or(CustodyError::NoVault)?;

        if self.vaults.iter().any(|v| v.has_validator(&source_key)) {
            return Err(CustodyError::ValidatorAlreadyRegistered {
                key: source_key.to_string(),
            });
        }

        let vault = self.vaults.get_mut(index).ok_or(CustodyError::NoVault)?;
        vault.validators.push(validator);
        Ok(&*vault)
    }

    /// Check that `validator` may join the mint authority of `mint`.
    ///
    /// The mint must be one the controller manages, and the validator must
    /// already sign for some vault on the Source Ledger.
    pub fn register_validator_to_mint(&self, validator: &Validator, mint: &Mint) -> Result<(), CustodyError> {
        if !self.mints.iter().any(|m| m.mint_address == mint.mint_address) {
            return Err(CustodyError::UnknownMint {
                mint: mint.mint_address.to_string(),
            });
        }
        let source_key = validator
            .source_key
            .ok_or(CustodyError::IncompleteValidator { ledger: "source" })?;
        let mint_key = validator
            .mint_key
            .ok_or(CustodyError::IncompleteValidator { ledger: "mint" })?;

        if !self.vaults.iter().any(|v| v.has_validator(&source_key)) {
            return Err(CustodyError::ValidatorNotRegistered {
                source_key: source_key.to_string(),
            });
        }

        if mint.has_mint_signer(&mint_key) {
            return Err(CustodyError::ValidatorAlreadyRegistered {
                key: mint_key.to_string(),
            });
        }

        Ok(())
    }

    /// Vault that will custody a deposit.
    pub fn select_vault_for_lock(&self, asset: &Asset, amount: Decimal) -> Result<&Vault, CustodyError> {
        let index = self
            .selector
            .select_for_lock(&self.vaults, asset, amount)
            .ok_or(CustodyError::NoVault)?;
        let vault = self.vaults.get(index).ok_or(CustodyError::NoVault)?;
        if vault.validators.is_empty() {
            return Err(CustodyError::VaultHasNoValidators {
                vault: vault.account_id.to_string(),
            });
        }
        Ok(vault)
    }

    /// Vault receiving a released deposit, which must be the vault
    /// `locked` the deposit was locked into.
    pub fn select_vault_for_release(&self, locked: &PublicKey) -> Result<&Vault, CustodyError> {
        let unknown = || CustodyError::UnknownVault {
            vault: locked.to_string(),
        };
        let index = self.selector.select_for_release(&self.vaults, locked).ok_or_else(unknown)?;
        match self.vaults.get(index) {
            Some(vault) if vault.account_id == *locked => Ok(vault),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from([b; 32])
    }

    fn vault_with(id: u8, validators: &[u8]) -> Vault {
        Vault::new(
            key(id),
            validators.iter().map(|b| Validator::source_only(key(*b))).collect(),
        )
    }

    /// Picks the vault with the fewest validators.
    struct LeastLoaded;

    impl VaultSelector for LeastLoaded {
        fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize> {
            vaults
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.validator_count())
                .map(|(i, _)| i)
        }

        fn select_for_lock(&self, vaults: &[Vault], _: &Asset, _: Decimal) -> Option<usize> {
            self.select_for_registration(vaults)
        }

        fn select_for_release(&self, vaults: &[Vault], _: &PublicKey) -> Option<usize> {
            self.select_for_registration(vaults)
        }
    }

    /// Returns an index past the end of the vault list.
    struct OutOfRange;

    impl VaultSelector for OutOfRange {
        fn select_for_registration(&self, vaults: &[Vault]) -> Option<usize> {
            Some(vaults.len())
        }

        fn select_for_lock(&self, vaults: &[Vault], _: &Asset, _: Decimal) -> Option<usize> {
            Some(vaults.len())
        }
    }

    #[test]
    fn test_register_without_vault_fails() {
        let mut controller = Controller::new(vec![], vec![]);
        let result = controller.register_validator_to_vault(Validator::new(key(2), key(3)));
        assert_eq!(result.unwrap_err(), CustodyError::NoVault);
    }

    #[test]
    fn test_register_appends_to_first_vault() {
        let mut controller = Controller::new(vec![vault_with(1, &[2]), vault_with(9, &[])], vec![]);
        let vault = controller
            .register_validator_to_vault(Validator::new(key(4), key(5)))
            .unwrap();
        assert_eq!(vault.account_id, key(1));
        assert_eq!(vault.validator_source_keys(), vec![key(2), key(4)]);
    }

    #[test]
    fn test_register_duplicate_source_key_rejected() {
        let mut controller = Controller::new(vec![vault_with(1, &[2])], vec![]);
        let result = controller.register_validator_to_vault(Validator::source_only(key(2)));
        assert!(matches!(
            result,
            Err(CustodyError::ValidatorAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_register_requires_source_key() {
        let mut controller = Controller::new(vec![vault_with(1, &[])], vec![]);
        let result = controller.register_validator_to_vault(Validator::mint_only(key(3)));
        assert_eq!(
            result.unwrap_err(),
            CustodyError::IncompleteValidator { ledger: "source" }
        );
    }

    #[test]
    fn test_register_to_mint_requires_vault_membership() {
        let mint = Mint::new(key(10), key(11), vec![]);
        let controller = Controller::new(vec![vault_with(1, &[2])], vec![mint.clone()]);

        let outsider = Validator::new(key(7), key(8));
        assert!(matches!(
            controller.register_validator_to_mint(&outsider, &mint),
            Err(CustodyError::ValidatorNotRegistered { .. })
        ));

        let member = Validator::new(key(2), key(3));
        assert!(controller.register_validator_to_mint(&member, &mint).is_ok());
    }

    #[test]
    fn test_register_to_mint_rejects_existing_signer() {
        let mint = Mint::new(key(10), key(11), vec![Validator::mint_only(key(3))]);
        let controller = Controller::new(vec![vault_with(1, &[2])], vec![mint.clone()]);
        let result = controller.register_validator_to_mint(&Validator::new(key(2), key(3)), &mint);
        assert!(matches!(
            result,
            Err(CustodyError::ValidatorAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_lock_selection_requires_validators() {
        let controller = Controller::new(vec![vault_with(1, &[])], vec![]);
        let result = controller.select_vault_for_lock(&Asset::Native, Decimal::ONE);
        assert!(matches!(result, Err(CustodyError::VaultHasNoValidators { .. })));
    }

    #[test]
    fn test_register_to_mint_rejects_unmanaged_mint() {
        let managed = Mint::new(key(10), key(11), vec![]);
        let controller = Controller::new(vec![vault_with(1, &[2])], vec![managed]);
        let other = Mint::new(key(20), key(21), vec![]);
        assert_eq!(
            controller.register_validator_to_mint(&Validator::new(key(2), key(3)), &other),
            Err(CustodyError::UnknownMint {
                mint: key(20).to_string(),
            })
        );
    }

    #[test]
    fn test_release_selection_without_vault() {
        let controller = Controller::new(vec![], vec![]);
        assert_eq!(
            controller.select_vault_for_release(&key(1)).unwrap_err(),
            CustodyError::UnknownVault {
                vault: key(1).to_string(),
            }
        );
    }

    #[test]
    fn test_release_selection_returns_lock_vault() {
        let controller = Controller::new(vec![vault_with(1, &[2]), vault_with(9, &[4])], vec![]);
        let vault = controller.select_vault_for_release(&key(9)).unwrap();
        assert_eq!(vault.account_id, key(9));
    }

    #[test]
    fn test_release_selection_rejects_vault_other_than_lock_vault() {
        let controller = Controller::with_selector(
            vec![vault_with(1, &[2, 3]), vault_with(9, &[4])],
            vec![],
            Arc::new(LeastLoaded),
        );
        assert!(matches!(
            controller.select_vault_for_release(&key(1)),
            Err(CustodyError::UnknownVault { .. })
        ));
    }

    #[test]
    fn test_out_of_range_selection_is_an_error() {
        let mut controller = Controller::with_selector(vec![vault_with(1, &[2])], vec![], Arc::new(OutOfRange));
        assert_eq!(
            controller
                .select_vault_for_lock(&Asset::Native, Decimal::ONE)
                .unwrap_err(),
            CustodyError::NoVault
        );
        assert_eq!(
            controller
                .register_validator_to_vault(Validator::new(key(4), key(5)))
                .unwrap_err(),
            CustodyError::NoVault
        );
    }

    #[test]
    fn test_injected_selector_is_used() {
        let controller = Controller::with_selector(
            vec![vault_with(1, &[2, 3]), vault_with(9, &[4])],
            vec![],
            Arc::new(LeastLoaded),
        );
        let vault = controller
            .select_vault_for_lock(&Asset::Native, Decimal::ONE)
            .unwrap();
        assert_eq!(vault.account_id, key(9));
    }

    #[test]
    fn test_mint_attribute_name() {
        assert_eq!(Controller::mint_attribute_name(&Asset::Native), "wXLM_mint");
        let usdc = Asset::credit("USDC", key(1));
        assert_eq!(Controller::mint_attribute_name(&usdc), "wUSDC_mint");
    }
}
