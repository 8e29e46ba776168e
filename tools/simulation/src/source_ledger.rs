//! In-memory Source Ledger
//!
//! Applies transactions atomically: authorization, sequence and time bound
//! checks run against the state before the transaction, operations are
//! applied to a copy, and the copy replaces the state only if every
//! operation succeeds. Accounts created inside a transaction authorize with
//! their own master key. Trustlines and reserves are not modelled.

use async_trait::async_trait;
use bridge_core::ledger::source::{
    Balance, ClaimableBalance, OperationBody, SourceAccount, SourceEnvelope, SourceLedger, SourceOperation,
    SourceTransaction,
};
use bridge_core::LedgerError;
use bridge_types::asset::Asset;
use bridge_types::ids::{PublicKey, TransactionHash};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::SimClock;

/// Fee per operation, in stroops.
pub const BASE_FEE: u32 = 100;

/// Maximum length of a data entry name and of its value.
pub const MAX_DATA_LEN: usize = 64;

fn rejected(reason: impl Into<String>) -> LedgerError {
    LedgerError::Rejected { reason: reason.into() }
}

fn not_found(id: &PublicKey) -> LedgerError {
    LedgerError::AccountNotFound {
        account: id.to_string(),
    }
}

/// Copy of the ledger contents, for before/after comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSnapshot {
    pub accounts: Vec<SourceAccount>,
    pub claimable_balances: Vec<ClaimableBalance>,
}

#[derive(Debug, Clone, Default)]
struct SourceState {
    /// In creation order.
    accounts: Vec<SourceAccount>,
    claimable_balances: Vec<ClaimableBalance>,
    ledger_sequence: i64,
    history: Vec<TransactionHash>,
}

impl SourceState {
    fn account(&self, id: &PublicKey) -> Option<&SourceAccount> {
        self.accounts.iter().find(|a| a.id == *id)
    }

    fn account_mut(&mut self, id: &PublicKey) -> Result<&mut SourceAccount, LedgerError> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == *id)
            .ok_or_else(|| not_found(id))
    }

    fn create_account(&mut self, id: PublicKey, starting_balance: Decimal) {
        let sequence = self.ledger_sequence << 32;
        self.accounts.push(SourceAccount::new(id, sequence, starting_balance));
    }

    fn debit(&mut self, id: &PublicKey, asset: &Asset, amount: Decimal) -> Result<(), LedgerError> {
        let account = self.account_mut(id)?;
        let balance = account
            .balances
            .iter_mut()
            .find(|b| b.asset == *asset)
            .filter(|b| b.amount >= amount)
            .ok_or_else(|| rejected(format!("op_underfunded: {} {} from {}", amount, asset, id)))?;
        balance.amount -= amount;
        Ok(())
    }

    fn credit(&mut self, id: &PublicKey, asset: &Asset, amount: Decimal) -> Result<(), LedgerError> {
        let account = self.account_mut(id)?;
        match account.balances.iter_mut().find(|b| b.asset == *asset) {
            Some(balance) => balance.amount += amount,
            None => account.balances.push(Balance {
                asset: asset.clone(),
                amount,
            }),
        }
        Ok(())
    }
}

/// Checks every account the transaction acts on against its signers.
///
/// Operations that change signers or weights need the high threshold,
/// everything else the medium one.
fn authorize(state: &SourceState, tx: &SourceTransaction, signed: &[PublicKey]) -> Result<(), LedgerError> {
    let created: Vec<PublicKey> = tx
        .operations
        .iter()
        .filter_map(|op| match &op.body {
            OperationBody::CreateAccount { destination, .. } => Some(*destination),
            _ => None,
        })
        .collect();

    for account_id in tx.source_accounts() {
        let changes_signers = tx.operations.iter().any(|op| {
            op.source.unwrap_or(tx.source_account) == account_id
                && matches!(op.body, OperationBody::SetOptions { .. })
        });
        match state.account(&account_id) {
            Some(account) => {
                let threshold = if changes_signers {
                    account.thresholds.high
                } else {
                    account.thresholds.medium
                };
                if !account.signer_set(threshold).is_satisfied_by(signed.iter()) {
                    return Err(rejected(format!("tx_bad_auth: {}", account_id)));
                }
            }
            None if created.contains(&account_id) => {
                if !signed.contains(&account_id) {
                    return Err(rejected(format!("tx_bad_auth: new account {}", account_id)));
                }
            }
            None => return Err(not_found(&account_id)),
        }
    }
    Ok(())
}

fn claimable_balance_id(hash: &TransactionHash, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hash.as_bytes());
    hasher.update((index as u64).to_be_bytes());
    hex::encode(hasher.finalize())
}

fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(rejected(format!("op_malformed: amount {}", amount)));
    }
    Ok(())
}

fn apply_operation(
    state: &mut SourceState,
    tx_source: PublicKey,
    hash: &TransactionHash,
    index: usize,
    op: &SourceOperation,
    now: i64,
) -> Result<(), LedgerError> {
    let source = op.source.unwrap_or(tx_source);
    match &op.body {
        OperationBody::CreateAccount {
            destination,
            starting_balance,
        } => {
            if state.account(destination).is_some() {
                return Err(rejected(format!("op_already_exists: {}", destination)));
            }
            require_positive(*starting_balance)?;
            state.debit(&source, &Asset::Native, *starting_balance)?;
            state.create_account(*destination, *starting_balance);
        }
        OperationBody::SetOptions {
            master_weight,
            thresholds,
            signer,
        } => {
            let account = state.account_mut(&source)?;
            if let Some(weight) = master_weight {
                account.master_weight = *weight;
            }
            if let Some(thresholds) = thresholds {
                account.thresholds = *thresholds;
            }
            if let Some(signer) = signer {
                if signer.key == account.id {
                    return Err(rejected("op_bad_signer"));
                }
                match account.signers.iter().position(|s| s.key == signer.key) {
                    Some(i) if signer.weight == 0 => {
                        account.signers.remove(i);
                    }
                    Some(i) => account.signers[i].weight = signer.weight,
                    None if signer.weight > 0 => account.signers.push(*signer),
                    None => {}
                }
            }
        }
        OperationBody::Payment {
            destination,
            asset,
            amount,
        } => {
            require_positive(*amount)?;
            if state.account(destination).is_none() {
                return Err(rejected(format!("op_no_destination: {}", destination)));
            }
            state.debit(&source, asset, *amount)?;
            state.credit(destination, asset, *amount)?;
        }
        OperationBody::ManageData { name, value } => {
            if name.is_empty() || name.len() > MAX_DATA_LEN {
                return Err(rejected(format!("op_invalid_name: {}", name)));
            }
            let account = state.account_mut(&source)?;
            match value {
                Some(v) if v.len() > MAX_DATA_LEN => {
                    return Err(rejected(format!("op_malformed: value of {} too long", name)));
                }
                Some(v) => {
                    account.data.insert(name.clone(), v.clone());
                }
                None => {
                    if account.data.remove(name).is_none() {
                        return Err(rejected(format!("op_name_not_found: {}", name)));
                    }
                }
            }
        }
        OperationBody::CreateClaimableBalance {
            asset,
            amount,
            claimants,
        } => {
            require_positive(*amount)?;
            if claimants.is_empty() {
                return Err(rejected("op_malformed: no claimants"));
            }
            state.debit(&source, asset, *amount)?;
            state.claimable_balances.push(ClaimableBalance {
                id: claimable_balance_id(hash, index),
                asset: asset.clone(),
                amount: *amount,
                sponsor: source,
                claimants: claimants.clone(),
                created_at: now,
            });
        }
        OperationBody::ClaimClaimableBalance { balance_id } => {
            let position = state
                .claimable_balances
                .iter()
                .position(|b| b.id == *balance_id)
                .ok_or_else(|| rejected(format!("op_does_not_exist: {}", balance_id)))?;
            if !state.claimable_balances[position].can_claim(&source, now) {
                return Err(rejected(format!("op_cannot_claim: {} by {}", balance_id, source)));
            }
            let balance = state.claimable_balances.remove(position);
            state.credit(&source, &balance.asset, balance.amount)?;
        }
    }
    Ok(())
}

pub struct InMemorySourceLedger {
    passphrase: String,
    clock: SimClock,
    state: Mutex<SourceState>,
}

impl InMemorySourceLedger {
    pub fn new(passphrase: impl Into<String>, clock: SimClock) -> Self {
        Self {
            passphrase: passphrase.into(),
            clock,
            state: Mutex::new(SourceState::default()),
        }
    }

    /// Create `id` with `amount` of the native asset, or top it up.
    pub async fn fund(&self, id: PublicKey, amount: Decimal) {
        let mut state = self.state.lock().await;
        state.ledger_sequence += 1;
        if state.account(&id).is_some() {
            // account exists, so credit cannot fail
            let _ = state.credit(&id, &Asset::Native, amount);
        } else {
            state.create_account(id, amount);
        }
    }

    /// Issue `amount` of `asset` to an existing account.
    pub async fn issue(&self, id: &PublicKey, asset: &Asset, amount: Decimal) -> Result<(), LedgerError> {
        self.state.lock().await.credit(id, asset, amount)
    }

    pub async fn snapshot(&self) -> SourceSnapshot {
        let state = self.state.lock().await;
        SourceSnapshot {
            accounts: state.accounts.clone(),
            claimable_balances: state.claimable_balances.clone(),
        }
    }

    /// Hashes of applied transactions, oldest first.
    pub async fn history(&self) -> Vec<TransactionHash> {
        self.state.lock().await.history.clone()
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

#[async_trait]
impl SourceLedger for InMemorySourceLedger {
    async fn load_account(&self, id: &PublicKey) -> Result<SourceAccount, LedgerError> {
        let state = self.state.lock().await;
        state.account(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn fetch_base_fee(&self) -> Result<u32, LedgerError> {
        Ok(BASE_FEE)
    }

    async fn accounts_for_signer(&self, signer: &PublicKey) -> Result<Vec<SourceAccount>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.is_signer(signer))
            .cloned()
            .collect())
    }

    async fn claimable_balances_for_claimant(
        &self,
        claimant: &PublicKey,
    ) -> Result<Vec<ClaimableBalance>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .claimable_balances
            .iter()
            .filter(|b| b.claimant(claimant).is_some())
            .cloned()
            .collect())
    }

    async fn submit_transaction(&self, envelope: SourceEnvelope) -> Result<TransactionHash, LedgerError> {
        let encoding = |e: bridge_core::TransactionError| rejected(format!("tx_malformed: {}", e));
        let hash = envelope.hash(&self.passphrase).map_err(encoding)?;
        let tx = envelope.inner();
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(bounds) = tx.time_bounds {
            if !bounds.contains(now) {
                warn!(tx = %hash, now, max_time = bounds.max_time, "Transaction outside time bounds");
                return Err(rejected("tx_too_late"));
            }
        }

        let source = state.account(&tx.source_account).ok_or_else(|| not_found(&tx.source_account))?;
        if tx.sequence != source.sequence + 1 {
            return Err(rejected(format!(
                "tx_bad_seq: expected {}, got {}",
                source.sequence + 1,
                tx.sequence
            )));
        }

        let min_fee = u64::from(BASE_FEE) * tx.operations.len() as u64;
        let (fee_payer, fee) = match &envelope {
            SourceEnvelope::Transaction(tx) => (tx.source_account, tx.fee),
            SourceEnvelope::FeeBump(bump) => {
                let payer = state.account(&bump.fee_source).ok_or_else(|| not_found(&bump.fee_source))?;
                let signed = bump.verified_signers(&self.passphrase).map_err(encoding)?;
                if !payer.signer_set(payer.thresholds.low).is_satisfied_by(signed.iter()) {
                    return Err(rejected(format!("tx_bad_auth: fee source {}", bump.fee_source)));
                }
                (bump.fee_source, bump.fee)
            }
        };
        if u64::from(fee) < min_fee {
            return Err(rejected(format!("tx_insufficient_fee: {} < {}", fee, min_fee)));
        }

        let signed = tx.verified_signers(&self.passphrase).map_err(encoding)?;
        authorize(&state, tx, &signed).inspect_err(|e| warn!(tx = %hash, error = %e, "Rejected transaction"))?;

        let mut next = (*state).clone();
        next.ledger_sequence += 1;
        next.account_mut(&tx.source_account)?.sequence = tx.sequence;
        next.debit(&fee_payer, &Asset::Native, Decimal::new(i64::from(fee), 7))?;
        for (index, op) in tx.operations.iter().enumerate() {
            apply_operation(&mut next, tx.source_account, &hash, index, op, now)
                .inspect_err(|e| warn!(tx = %hash, index, error = %e, "Operation failed"))?;
        }
        next.history.push(hash);
        *state = next;

        debug!(tx = %hash, operations = tx.operations.len(), "Applied transaction");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::ledger::source::{ClaimPredicate, Claimant, SourceTransactionBuilder, Thresholds};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    const PASSPHRASE: &str = "Sim Network";

    async fn ledger_with(keys: &[&SigningKey]) -> InMemorySourceLedger {
        let ledger = InMemorySourceLedger::new(PASSPHRASE, SimClock::starting_at(1_000_000));
        for key in keys {
            ledger.fund(PublicKey::from(*key), Decimal::from(100)).await;
        }
        ledger
    }

    async fn build(ledger: &InMemorySourceLedger, source: &SigningKey, ops: Vec<SourceOperation>) -> SourceTransaction {
        let account = ledger.load_account(&PublicKey::from(source)).await.unwrap();
        ops.into_iter()
            .fold(SourceTransactionBuilder::new(&account, BASE_FEE), |b, op| b.add_operation(op))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_payment_moves_funds_and_charges_fee() {
        let alice = SigningKey::generate(&mut OsRng);
        let bob = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice, &bob]).await;

        let mut tx = build(
            &ledger,
            &alice,
            vec![SourceOperation::payment(PublicKey::from(&bob), Asset::Native, Decimal::from(10))],
        )
        .await;
        tx.sign(&alice, PASSPHRASE).unwrap();
        ledger.submit_transaction(tx.into()).await.unwrap();

        let alice_account = ledger.load_account(&PublicKey::from(&alice)).await.unwrap();
        let bob_account = ledger.load_account(&PublicKey::from(&bob)).await.unwrap();
        assert_eq!(alice_account.balance_of(&Asset::Native), Decimal::new(899_999_900, 7));
        assert_eq!(bob_account.balance_of(&Asset::Native), Decimal::from(110));
    }

    #[tokio::test]
    async fn test_unsigned_transaction_rejected_without_effect() {
        let alice = SigningKey::generate(&mut OsRng);
        let bob = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice, &bob]).await;
        let before = ledger.snapshot().await;

        let mut tx = build(
            &ledger,
            &alice,
            vec![SourceOperation::payment(PublicKey::from(&bob), Asset::Native, Decimal::from(10))],
        )
        .await;
        tx.sign(&bob, PASSPHRASE).unwrap();
        let err = ledger.submit_transaction(tx.into()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert_eq!(ledger.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_failed_operation_rolls_back_whole_transaction() {
        let alice = SigningKey::generate(&mut OsRng);
        let bob = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice, &bob]).await;
        let before = ledger.snapshot().await;

        let mut tx = build(
            &ledger,
            &alice,
            vec![
                SourceOperation::payment(PublicKey::from(&bob), Asset::Native, Decimal::from(10)),
                SourceOperation::payment(PublicKey::from(&bob), Asset::Native, Decimal::from(1_000)),
            ],
        )
        .await;
        tx.sign(&alice, PASSPHRASE).unwrap();
        assert!(ledger.submit_transaction(tx.into()).await.is_err());
        assert_eq!(ledger.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_sequence_replay_rejected() {
        let alice = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice]).await;
        let mut tx = build(&ledger, &alice, vec![SourceOperation::manage_data("k", "v")]).await;
        tx.sign(&alice, PASSPHRASE).unwrap();

        ledger.submit_transaction(tx.clone().into()).await.unwrap();
        let err = ledger.submit_transaction(tx.into()).await.unwrap_err();
        assert!(err.to_string().contains("tx_bad_seq"));
    }

    #[tokio::test]
    async fn test_weighted_account_needs_threshold() {
        let owner = SigningKey::generate(&mut OsRng);
        let a = SigningKey::generate(&mut OsRng);
        let b = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&owner]).await;

        let mut setup = build(
            &ledger,
            &owner,
            vec![
                SourceOperation::set_signer(PublicKey::from(&a), 1),
                SourceOperation::set_signer(PublicKey::from(&b), 1),
                SourceOperation::set_weights(0, Thresholds::uniform(2)),
            ],
        )
        .await;
        setup.sign(&owner, PASSPHRASE).unwrap();
        ledger.submit_transaction(setup.into()).await.unwrap();

        let mut single = build(&ledger, &owner, vec![SourceOperation::manage_data("k", "v")]).await;
        single.sign(&a, PASSPHRASE).unwrap();
        single.sign(&owner, PASSPHRASE).unwrap();
        assert!(ledger.submit_transaction(single.clone().into()).await.is_err());

        single.sign(&b, PASSPHRASE).unwrap();
        ledger.submit_transaction(single.into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_claimable_balance_predicates() {
        let depositor = SigningKey::generate(&mut OsRng);
        let claimer = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&depositor, &claimer]).await;
        let claimer_key = PublicKey::from(&claimer);
        let depositor_key = PublicKey::from(&depositor);

        let mut create = build(
            &ledger,
            &depositor,
            vec![SourceOperation::create_claimable_balance(
                Asset::Native,
                Decimal::from(5),
                vec![
                    Claimant::new(claimer_key, ClaimPredicate::BeforeRelativeTime { seconds: 60 }),
                    Claimant::new(
                        depositor_key,
                        ClaimPredicate::not(ClaimPredicate::BeforeRelativeTime { seconds: 61 }),
                    ),
                ],
            )],
        )
        .await;
        create.sign(&depositor, PASSPHRASE).unwrap();
        ledger.submit_transaction(create.into()).await.unwrap();

        let balances = ledger.claimable_balances_for_claimant(&claimer_key).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].sponsor, depositor_key);
        let id = balances[0].id.clone();

        let mut early = build(&ledger, &depositor, vec![SourceOperation::claim_claimable_balance(id.clone())]).await;
        early.sign(&depositor, PASSPHRASE).unwrap();
        assert!(ledger.submit_transaction(early.into()).await.is_err());

        ledger.clock().advance(61);
        let mut late = build(&ledger, &claimer, vec![SourceOperation::claim_claimable_balance(id.clone())]).await;
        late.sign(&claimer, PASSPHRASE).unwrap();
        assert!(ledger.submit_transaction(late.into()).await.is_err());

        let mut reclaim = build(&ledger, &depositor, vec![SourceOperation::claim_claimable_balance(id)]).await;
        reclaim.sign(&depositor, PASSPHRASE).unwrap();
        ledger.submit_transaction(reclaim.into()).await.unwrap();
        assert!(ledger.claimable_balances_for_claimant(&claimer_key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_entry_limits() {
        let alice = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice]).await;
        let mut tx = build(&ledger, &alice, vec![SourceOperation::manage_data("k", vec![0u8; 65])]).await;
        tx.sign(&alice, PASSPHRASE).unwrap();
        let err = ledger.submit_transaction(tx.into()).await.unwrap_err();
        assert!(err.to_string().contains("op_malformed"));
    }

    #[tokio::test]
    async fn test_expired_time_bounds_rejected() {
        let alice = SigningKey::generate(&mut OsRng);
        let ledger = ledger_with(&[&alice]).await;
        let account = ledger.load_account(&PublicKey::from(&alice)).await.unwrap();
        let start = chrono::DateTime::from_timestamp(ledger.clock().now(), 0).unwrap();
        let mut tx = SourceTransactionBuilder::new(&account, BASE_FEE)
            .add_operation(SourceOperation::manage_data("k", "v"))
            .set_timeout(start, 30)
            .build()
            .unwrap();
        tx.sign(&alice, PASSPHRASE).unwrap();

        ledger.clock().advance(31);
        let err = ledger.submit_transaction(tx.into()).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected { reason: "tx_too_late".into() });
    }
}
