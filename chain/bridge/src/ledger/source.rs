//! Source Ledger model
//!
//! Accounts carry a master key weight, additional weighted signers, three
//! thresholds and named data entries. Value can be parked in claimable
//! balances guarded by time predicates. Transactions are signed over
//! `SHA-256(SHA-256(passphrase) || "tx" || body)` and the same digest is the
//! transaction hash.

use async_trait::async_trait;
use bridge_types::asset::Asset;
use bridge_types::ids::{PublicKey, SignatureBytes, TransactionHash};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, SigningKey, Verifier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::errors::{LedgerError, TransactionError};
use crate::thresholds::WeightedSignerSet;

// ───────────────────────── Accounts ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub key: PublicKey,
    pub weight: u8,
}

impl Signer {
    pub fn new(key: PublicKey, weight: u8) -> Self {
        Self { key, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Thresholds {
    /// Same threshold at every level.
    pub fn uniform(threshold: u8) -> Self {
        Self {
            low: threshold,
            medium: threshold,
            high: threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: Asset,
    pub amount: Decimal,
}

/// Snapshot of a Source Ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAccount {
    pub id: PublicKey,
    pub sequence: i64,
    pub balances: Vec<Balance>,
    pub master_weight: u8,
    /// Additional signers, excluding the master key.
    pub signers: Vec<Signer>,
    pub thresholds: Thresholds,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SourceAccount {
    /// Fresh account as created by `CreateAccount`: master key weight 1, zero thresholds.
    pub fn new(id: PublicKey, sequence: i64, starting_balance: Decimal) -> Self {
        Self {
            id,
            sequence,
            balances: vec![Balance {
                asset: Asset::Native,
                amount: starting_balance,
            }],
            master_weight: 1,
            signers: Vec::new(),
            thresholds: Thresholds::default(),
            data: BTreeMap::new(),
        }
    }

    /// Data entry decoded as UTF-8. Entries that are not valid UTF-8 read as absent.
    pub fn data_str(&self, name: &str) -> Option<&str> {
        self.data
            .get(name)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Weight of `key` on this account, counting the master key.
    pub fn signer_weight(&self, key: &PublicKey) -> u8 {
        if *key == self.id {
            return self.master_weight;
        }
        self.signers
            .iter()
            .find(|s| s.key == *key)
            .map(|s| s.weight)
            .unwrap_or(0)
    }

    pub fn is_signer(&self, key: &PublicKey) -> bool {
        self.signer_weight(key) > 0
    }

    /// Keys holding exactly `weight` on this account, master key excluded.
    pub fn signers_with_weight(&self, weight: u8) -> Vec<PublicKey> {
        self.signers
            .iter()
            .filter(|s| s.weight == weight)
            .map(|s| s.key)
            .collect()
    }

    pub fn balance_of(&self, asset: &Asset) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == *asset)
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Weighted signer set against the given threshold, master key included.
    pub fn signer_set(&self, threshold: u8) -> WeightedSignerSet {
        self.signers.iter().fold(
            WeightedSignerSet::new(threshold).with_signer(self.id, self.master_weight),
            |set, s| set.with_signer(s.key, s.weight),
        )
    }
}

// ───────────────────────── Claimable balances ─────────────────────────

/// Condition under which a claimant may claim a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimPredicate {
    Unconditional,
    /// Seconds after the balance was created.
    BeforeRelativeTime { seconds: i64 },
    /// Unix timestamp.
    BeforeAbsoluteTime { epoch_secs: i64 },
    Not { predicate: Box<ClaimPredicate> },
}

impl ClaimPredicate {
    pub fn not(predicate: ClaimPredicate) -> Self {
        ClaimPredicate::Not {
            predicate: Box::new(predicate),
        }
    }

    /// Evaluate for a balance created at `created_at`, at time `now`.
    pub fn is_satisfied(&self, created_at: i64, now: i64) -> bool {
        match self {
            ClaimPredicate::Unconditional => true,
            ClaimPredicate::BeforeRelativeTime { seconds } => {
                now < created_at.saturating_add(*seconds)
            }
            ClaimPredicate::BeforeAbsoluteTime { epoch_secs } => now < *epoch_secs,
            ClaimPredicate::Not { predicate } => !predicate.is_satisfied(created_at, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimant {
    pub destination: PublicKey,
    pub predicate: ClaimPredicate,
}

impl Claimant {
    pub fn new(destination: PublicKey, predicate: ClaimPredicate) -> Self {
        Self {
            destination,
            predicate,
        }
    }
}

/// Value parked on the ledger until one of its claimants claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalance {
    pub id: String,
    pub asset: Asset,
    pub amount: Decimal,
    /// Account that created and funded the balance.
    pub sponsor: PublicKey,
    pub claimants: Vec<Claimant>,
    pub created_at: i64,
}

impl ClaimableBalance {
    pub fn claimant(&self, key: &PublicKey) -> Option<&Claimant> {
        self.claimants.iter().find(|c| c.destination == *key)
    }

    /// Whether `key` may claim the balance at `now`.
    pub fn can_claim(&self, key: &PublicKey, now: i64) -> bool {
        self.claimant(key)
            .is_some_and(|c| c.predicate.is_satisfied(self.created_at, now))
    }
}

// ───────────────────────── Operations ─────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    CreateAccount {
        destination: PublicKey,
        starting_balance: Decimal,
    },
    SetOptions {
        master_weight: Option<u8>,
        thresholds: Option<Thresholds>,
        /// Add, reweight or (with weight 0) remove one signer.
        signer: Option<Signer>,
    },
    Payment {
        destination: PublicKey,
        asset: Asset,
        amount: Decimal,
    },
    ManageData {
        name: String,
        /// `None` deletes the entry.
        value: Option<Vec<u8>>,
    },
    CreateClaimableBalance {
        asset: Asset,
        amount: Decimal,
        claimants: Vec<Claimant>,
    },
    ClaimClaimableBalance {
        balance_id: String,
    },
}

/// An operation, optionally acting on an account other than the transaction source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOperation {
    pub source: Option<PublicKey>,
    pub body: OperationBody,
}

impl SourceOperation {
    pub fn new(body: OperationBody) -> Self {
        Self { source: None, body }
    }

    pub fn with_source(mut self, source: PublicKey) -> Self {
        self.source = Some(source);
        self
    }

    pub fn create_account(destination: PublicKey, starting_balance: Decimal) -> Self {
        Self::new(OperationBody::CreateAccount {
            destination,
            starting_balance,
        })
    }

    pub fn set_signer(key: PublicKey, weight: u8) -> Self {
        Self::new(OperationBody::SetOptions {
            master_weight: None,
            thresholds: None,
            signer: Some(Signer::new(key, weight)),
        })
    }

    pub fn set_weights(master_weight: u8, thresholds: Thresholds) -> Self {
        Self::new(OperationBody::SetOptions {
            master_weight: Some(master_weight),
            thresholds: Some(thresholds),
            signer: None,
        })
    }

    pub fn payment(destination: PublicKey, asset: Asset, amount: Decimal) -> Self {
        Self::new(OperationBody::Payment {
            destination,
            asset,
            amount,
        })
    }

    pub fn manage_data(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(OperationBody::ManageData {
            name: name.into(),
            value: Some(value.into()),
        })
    }

    pub fn create_claimable_balance(asset: Asset, amount: Decimal, claimants: Vec<Claimant>) -> Self {
        Self::new(OperationBody::CreateClaimableBalance {
            asset,
            amount,
            claimants,
        })
    }

    pub fn claim_claimable_balance(balance_id: impl Into<String>) -> Self {
        Self::new(OperationBody::ClaimClaimableBalance {
            balance_id: balance_id.into(),
        })
    }
}

// ───────────────────────── Transactions ─────────────────────────

/// Validity window in unix seconds. A `max_time` of 0 means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: i64,
    pub max_time: i64,
}

impl TimeBounds {
    pub fn contains(&self, now: i64) -> bool {
        now >= self.min_time && (self.max_time == 0 || now <= self.max_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub signer: PublicKey,
    pub signature: SignatureBytes,
}

fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

fn signature_base(passphrase: &str, tag: &[u8], body: &impl Serialize) -> Result<Vec<u8>, TransactionError> {
    let encoded = serde_json::to_vec(body).map_err(|e| TransactionError::Encoding(e.to_string()))?;
    let mut base = Vec::with_capacity(32 + tag.len() + encoded.len());
    base.extend_from_slice(&network_id(passphrase));
    base.extend_from_slice(tag);
    base.extend_from_slice(&encoded);
    Ok(base)
}

fn sign_hash(signatures: &mut Vec<DecoratedSignature>, key: &SigningKey, hash: &TransactionHash) {
    let signer = PublicKey::from(key);
    let signature = SignatureBytes::from(&key.sign(hash.as_bytes()));
    signatures.retain(|s| s.signer != signer);
    signatures.push(DecoratedSignature { signer, signature });
}

fn verified(signatures: &[DecoratedSignature], hash: &TransactionHash) -> Vec<PublicKey> {
    signatures
        .iter()
        .filter(|s| {
            s.signer
                .to_verifying_key()
                .is_some_and(|vk| vk.verify(hash.as_bytes(), &s.signature.to_signature()).is_ok())
        })
        .map(|s| s.signer)
        .collect()
}

#[derive(Serialize)]
struct TransactionBody<'a> {
    source_account: &'a PublicKey,
    sequence: i64,
    fee: u32,
    time_bounds: &'a Option<TimeBounds>,
    operations: &'a [SourceOperation],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTransaction {
    pub source_account: PublicKey,
    pub sequence: i64,
    pub fee: u32,
    pub time_bounds: Option<TimeBounds>,
    pub operations: Vec<SourceOperation>,
    pub signatures: Vec<DecoratedSignature>,
}

impl SourceTransaction {
    fn body(&self) -> TransactionBody<'_> {
        TransactionBody {
            source_account: &self.source_account,
            sequence: self.sequence,
            fee: self.fee,
            time_bounds: &self.time_bounds,
            operations: &self.operations,
        }
    }

    /// Bytes whose SHA-256 is signed. Signatures are not part of it.
    pub fn signature_base(&self, passphrase: &str) -> Result<Vec<u8>, TransactionError> {
        signature_base(passphrase, b"tx", &self.body())
    }

    pub fn hash(&self, passphrase: &str) -> Result<TransactionHash, TransactionError> {
        let digest: [u8; 32] = Sha256::digest(self.signature_base(passphrase)?).into();
        Ok(TransactionHash::from(digest))
    }

    /// Add (or replace) the signature of `key`.
    pub fn sign(&mut self, key: &SigningKey, passphrase: &str) -> Result<(), TransactionError> {
        let hash = self.hash(passphrase)?;
        sign_hash(&mut self.signatures, key, &hash);
        Ok(())
    }

    /// Attach a signature produced elsewhere.
    pub fn add_signature(&mut self, signature: DecoratedSignature) {
        self.signatures.retain(|s| s.signer != signature.signer);
        self.signatures.push(signature);
    }

    /// Keys whose attached signature is valid for this transaction.
    pub fn verified_signers(&self, passphrase: &str) -> Result<Vec<PublicKey>, TransactionError> {
        Ok(verified(&self.signatures, &self.hash(passphrase)?))
    }

    /// Distinct accounts touched as operation sources, including the transaction source.
    pub fn source_accounts(&self) -> Vec<PublicKey> {
        let mut accounts = vec![self.source_account];
        for op in &self.operations {
            if let Some(src) = op.source {
                if !accounts.contains(&src) {
                    accounts.push(src);
                }
            }
        }
        accounts
    }
}

#[derive(Serialize)]
struct FeeBumpBody<'a> {
    fee_source: &'a PublicKey,
    fee: u32,
    inner_hash: TransactionHash,
}

/// Wraps a signed transaction so that `fee_source` pays its fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBumpTransaction {
    pub fee_source: PublicKey,
    pub fee: u32,
    pub inner: SourceTransaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl FeeBumpTransaction {
    pub fn new(fee_source: PublicKey, fee: u32, inner: SourceTransaction) -> Result<Self, TransactionError> {
        if fee < inner.fee {
            return Err(TransactionError::FeeBumpTooLow {
                fee,
                inner_fee: inner.fee,
            });
        }
        Ok(Self {
            fee_source,
            fee,
            inner,
            signatures: Vec::new(),
        })
    }

    pub fn hash(&self, passphrase: &str) -> Result<TransactionHash, TransactionError> {
        let body = FeeBumpBody {
            fee_source: &self.fee_source,
            fee: self.fee,
            inner_hash: self.inner.hash(passphrase)?,
        };
        let digest: [u8; 32] = Sha256::digest(signature_base(passphrase, b"fee_bump", &body)?).into();
        Ok(TransactionHash::from(digest))
    }

    pub fn sign(&mut self, key: &SigningKey, passphrase: &str) -> Result<(), TransactionError> {
        let hash = self.hash(passphrase)?;
        sign_hash(&mut self.signatures, key, &hash);
        Ok(())
    }

    pub fn verified_signers(&self, passphrase: &str) -> Result<Vec<PublicKey>, TransactionError> {
        Ok(verified(&self.signatures, &self.hash(passphrase)?))
    }
}

/// What gets submitted to the Source Ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEnvelope {
    Transaction(SourceTransaction),
    FeeBump(FeeBumpTransaction),
}

impl SourceEnvelope {
    pub fn hash(&self, passphrase: &str) -> Result<TransactionHash, TransactionError> {
        match self {
            SourceEnvelope::Transaction(tx) => tx.hash(passphrase),
            SourceEnvelope::FeeBump(fb) => fb.hash(passphrase),
        }
    }

    pub fn inner(&self) -> &SourceTransaction {
        match self {
            SourceEnvelope::Transaction(tx) => tx,
            SourceEnvelope::FeeBump(fb) => &fb.inner,
        }
    }
}

impl From<SourceTransaction> for SourceEnvelope {
    fn from(tx: SourceTransaction) -> Self {
        SourceEnvelope::Transaction(tx)
    }
}

impl From<FeeBumpTransaction> for SourceEnvelope {
    fn from(tx: FeeBumpTransaction) -> Self {
        SourceEnvelope::FeeBump(tx)
    }
}

/// Assembles a transaction for the next sequence number of an account.
#[derive(Debug, Clone)]
pub struct SourceTransactionBuilder {
    source_account: PublicKey,
    sequence: i64,
    base_fee: u32,
    time_bounds: Option<TimeBounds>,
    operations: Vec<SourceOperation>,
}

impl SourceTransactionBuilder {
    pub fn new(account: &SourceAccount, base_fee: u32) -> Self {
        Self {
            source_account: account.id,
            sequence: account.sequence + 1,
            base_fee,
            time_bounds: None,
            operations: Vec::new(),
        }
    }

    pub fn add_operation(mut self, operation: SourceOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Valid from now until `timeout_secs` later.
    pub fn set_timeout(mut self, now: DateTime<Utc>, timeout_secs: u64) -> Self {
        let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
        self.time_bounds = Some(TimeBounds {
            min_time: 0,
            max_time: now.timestamp().saturating_add(timeout),
        });
        self
    }

    pub fn build(self) -> Result<SourceTransaction, TransactionError> {
        if self.operations.is_empty() {
            return Err(TransactionError::Empty);
        }
        let overflow = TransactionError::FeeOverflow {
            base_fee: self.base_fee,
            operations: self.operations.len(),
        };
        let count = u32::try_from(self.operations.len()).map_err(|_| overflow.clone())?;
        let fee = self.base_fee.checked_mul(count).ok_or(overflow)?;
        Ok(SourceTransaction {
            source_account: self.source_account,
            sequence: self.sequence,
            fee,
            time_bounds: self.time_bounds,
            operations: self.operations,
            signatures: Vec::new(),
        })
    }
}

// ───────────────────────── Collaborator ─────────────────────────

/// Read and submit access to the Source Ledger.
#[async_trait]
pub trait SourceLedger: Send + Sync {
    async fn load_account(&self, id: &PublicKey) -> Result<SourceAccount, LedgerError>;

    /// Per-operation base fee.
    async fn fetch_base_fee(&self) -> Result<u32, LedgerError>;

    /// Every account on which `signer` holds a non-zero weight.
    async fn accounts_for_signer(&self, signer: &PublicKey) -> Result<Vec<SourceAccount>, LedgerError>;

    /// Unclaimed balances naming `claimant`.
    async fn claimable_balances_for_claimant(
        &self,
        claimant: &PublicKey,
    ) -> Result<Vec<ClaimableBalance>, LedgerError>;

    async fn submit_transaction(&self, envelope: SourceEnvelope) -> Result<TransactionHash, LedgerError>;
}
