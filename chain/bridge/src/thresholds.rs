//! Weighted signer schemes for custody accounts
//!
//! Every custody account is governed by a weight per signer and a single
//! threshold (low, medium and high thresholds are always set equal). The
//! schemes below are re-derived from the current validator count whenever
//! membership changes.
//!
//! | Account | Controller | Validator | Other | Threshold |
//! |---|---|---|---|---|
//! | Vault (N validators) | N | 1 | – | N + 1 |
//! | Validator stake escrow | config key 2 | 1 | – | 2 |
//! | ETxA (N validators) | 2N | 2 | depositor 1 | 2N + 2 |
//! | Mint authority multisig | member | member | – | max(N, 2) signatures |

use bridge_types::ids::PublicKey;
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::BridgeError;
use crate::ledger::mint::MAX_MULTISIG_SIGNERS;

/// Signer weights plus the threshold an authorization must reach.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeightedSignerSet {
    weights: BTreeMap<PublicKey, u8>,
    threshold: u8,
}

impl WeightedSignerSet {
    pub fn new(threshold: u8) -> Self {
        Self {
            weights: BTreeMap::new(),
            threshold,
        }
    }

    /// Add or replace a signer. A zero weight removes it.
    pub fn with_signer(mut self, key: PublicKey, weight: u8) -> Self {
        self.set_weight(key, weight);
        self
    }

    pub fn set_weight(&mut self, key: PublicKey, weight: u8) {
        if weight == 0 {
            self.weights.remove(&key);
        } else {
            self.weights.insert(key, weight);
        }
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn weight_of(&self, key: &PublicKey) -> u8 {
        self.weights.get(key).copied().unwrap_or(0)
    }

    pub fn signers(&self) -> impl Iterator<Item = (&PublicKey, &u8)> {
        self.weights.iter()
    }

    /// Combined weight of the distinct keys in `signers`.
    pub fn total_weight<'a>(&self, signers: impl IntoIterator<Item = &'a PublicKey>) -> u32 {
        signers
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|k| u32::from(self.weight_of(k)))
            .sum()
    }

    /// Whether `signers` together reach the threshold.
    ///
    /// A zero threshold still requires at least one weighted signature.
    pub fn is_satisfied_by<'a>(&self, signers: impl IntoIterator<Item = &'a PublicKey>) -> bool {
        let needed = u32::from(self.threshold.max(1));
        self.total_weight(signers) >= needed
    }
}

// ───────────────────────── Vault ─────────────────────────

/// Vault weights for a given number of validators.
///
/// The controller weight tracks the validator count so that the controller
/// plus any one validator reaches the threshold, while all validators
/// together fall one short without the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultScheme {
    pub validator_count: usize,
    pub controller_weight: u8,
    pub validator_weight: u8,
    pub threshold: u8,
}

impl VaultScheme {
    pub const VALIDATOR_WEIGHT: u8 = 1;

    pub fn for_validator_count(validator_count: usize) -> Result<Self, BridgeError> {
        // threshold = count + 1 must fit a u8
        if validator_count == 0 || validator_count >= usize::from(u8::MAX) {
            return Err(BridgeError::WeightOverflow {
                validators: validator_count,
            });
        }
        let count = validator_count as u8;
        Ok(Self {
            validator_count,
            controller_weight: count,
            validator_weight: Self::VALIDATOR_WEIGHT,
            threshold: count + 1,
        })
    }

    pub fn signer_set(&self, controller: PublicKey, validators: &[PublicKey]) -> WeightedSignerSet {
        validators.iter().fold(
            WeightedSignerSet::new(self.threshold).with_signer(controller, self.controller_weight),
            |set, v| set.with_signer(*v, self.validator_weight),
        )
    }
}

// ───────────────────────── Validator stake ─────────────────────────

/// Stake escrow weights: the controller-config key alone can reclaim the stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeScheme;

impl StakeScheme {
    pub const CONFIG_WEIGHT: u8 = 2;
    pub const VALIDATOR_WEIGHT: u8 = 1;
    pub const THRESHOLD: u8 = 2;

    pub fn signer_set(config: PublicKey, validator: PublicKey) -> WeightedSignerSet {
        WeightedSignerSet::new(Self::THRESHOLD)
            .with_signer(config, Self::CONFIG_WEIGHT)
            .with_signer(validator, Self::VALIDATOR_WEIGHT)
    }
}

// ───────────────────────── Escrow transaction account ─────────────────────────

/// ETxA weights for a vault with a given number of validators.
///
/// Controller plus any single validator authorizes; the depositor's weight
/// never completes a threshold together with either side alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowScheme {
    pub validator_count: usize,
    pub controller_weight: u8,
    pub validator_weight: u8,
    pub depositor_weight: u8,
    pub threshold: u8,
}

impl EscrowScheme {
    pub const VALIDATOR_WEIGHT: u8 = 2;
    pub const DEPOSITOR_WEIGHT: u8 = 1;

    pub fn for_validator_count(validator_count: usize) -> Result<Self, BridgeError> {
        let overflow = BridgeError::WeightOverflow {
            validators: validator_count,
        };
        if validator_count == 0 {
            return Err(overflow);
        }
        let controller_weight = u8::try_from(validator_count * 2).map_err(|_| overflow.clone())?;
        let threshold = controller_weight
            .checked_add(Self::VALIDATOR_WEIGHT)
            .ok_or(overflow)?;
        Ok(Self {
            validator_count,
            controller_weight,
            validator_weight: Self::VALIDATOR_WEIGHT,
            depositor_weight: Self::DEPOSITOR_WEIGHT,
            threshold,
        })
    }

    pub fn signer_set(
        &self,
        controller: PublicKey,
        validators: &[PublicKey],
        depositor: PublicKey,
    ) -> WeightedSignerSet {
        validators
            .iter()
            .fold(WeightedSignerSet::new(self.threshold), |set, v| {
                set.with_signer(*v, self.validator_weight)
            })
            .with_signer(controller, self.controller_weight)
            .with_signer(depositor, self.depositor_weight)
    }
}

// ───────────────────────── Mint authority ─────────────────────────

/// Multisig membership and signature threshold for the mint authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAuthorityScheme {
    /// Controller first, then validators in joining order.
    pub members: Vec<PublicKey>,
    pub threshold: u8,
}

impl MintAuthorityScheme {
    /// Never fewer than two signatures, so neither the controller nor a
    /// single validator can mint alone.
    pub const MIN_THRESHOLD: u8 = 2;

    pub fn for_members(controller: PublicKey, validators: &[PublicKey]) -> Result<Self, BridgeError> {
        let members: Vec<PublicKey> = std::iter::once(controller)
            .chain(validators.iter().copied())
            .collect();
        if validators.is_empty() || members.len() > MAX_MULTISIG_SIGNERS {
            return Err(BridgeError::MultisigCapacityExceeded {
                members: members.len(),
                max: MAX_MULTISIG_SIGNERS,
            });
        }
        // bounded by MAX_MULTISIG_SIGNERS above
        let threshold = (validators.len() as u8).max(Self::MIN_THRESHOLD);
        Ok(Self { members, threshold })
    }

    /// Whether `signers` provide enough distinct member signatures.
    pub fn is_satisfied_by<'a>(&self, signers: impl IntoIterator<Item = &'a PublicKey>) -> bool {
        let distinct: BTreeSet<_> = signers
            .into_iter()
            .filter(|k| self.members.contains(k))
            .collect();
        distinct.len() >= usize::from(self.threshold)
    }
}
