//! In-memory Mint Ledger
//!
//! Accounts, mints, multisig authorities and token balances, with
//! transactions applied all-or-nothing. Token balances are tracked per
//! (mint, owner) pair; there are no associated token accounts.

use async_trait::async_trait;
use bridge_core::ledger::mint::{
    AccountInfo, AccountOwner, AuthorityType, ConfirmedTransaction, MintInfo, MintInstruction, MintLedger,
    MintTransaction, MultisigInfo, MAX_MULTISIG_SIGNERS, MINT_SIZE, MULTISIG_SIZE,
};
use bridge_core::LedgerError;
use bridge_types::ids::{Blockhash, PublicKey, SignatureBytes};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Fee charged to the fee payer per signature.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

const RENT_ACCOUNT_OVERHEAD: u64 = 128;
const RENT_LAMPORTS_PER_BYTE: u64 = 6_960;

/// How many blockhashes a transaction may reference.
const RECENT_BLOCKHASHES: usize = 150;

fn rejected(reason: impl Into<String>) -> LedgerError {
    LedgerError::Rejected { reason: reason.into() }
}

/// Rent-exempt minimum for an account holding `data_len` bytes.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (RENT_ACCOUNT_OVERHEAD + data_len as u64) * RENT_LAMPORTS_PER_BYTE
}

#[derive(Debug, Clone)]
struct TokenMint {
    mint_authority: Option<PublicKey>,
    freeze_authority: Option<PublicKey>,
    supply: u64,
    decimals: u8,
}

#[derive(Debug, Clone)]
struct Multisig {
    threshold: u8,
    signers: Vec<PublicKey>,
}

#[derive(Debug, Clone)]
enum AccountData {
    Uninitialized,
    Mint(TokenMint),
    Multisig(Multisig),
}

#[derive(Debug, Clone)]
struct StoredAccount {
    owner: AccountOwner,
    lamports: u64,
    data_len: usize,
    data: AccountData,
}

#[derive(Debug, Clone)]
struct MintState {
    slot: u64,
    accounts: BTreeMap<PublicKey, StoredAccount>,
    /// Keyed by (mint, owner).
    token_balances: BTreeMap<(PublicKey, PublicKey), u64>,
    recent_blockhashes: VecDeque<Blockhash>,
    transactions: HashMap<SignatureBytes, ConfirmedTransaction>,
}

impl MintState {
    fn genesis() -> Self {
        let genesis: [u8; 32] = Sha256::digest(b"genesis").into();
        Self {
            slot: 0,
            accounts: BTreeMap::new(),
            token_balances: BTreeMap::new(),
            recent_blockhashes: VecDeque::from([Blockhash::from(genesis)]),
            transactions: HashMap::new(),
        }
    }

    fn latest_blockhash(&self) -> Blockhash {
        // never empty: seeded at genesis and only trimmed from the front
        self.recent_blockhashes
            .back()
            .copied()
            .unwrap_or_else(|| Blockhash::from([0; 32]))
    }

    fn advance_slot(&mut self) {
        self.slot += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.latest_blockhash().as_bytes());
        hasher.update(self.slot.to_be_bytes());
        let next: [u8; 32] = hasher.finalize().into();
        self.recent_blockhashes.push_back(Blockhash::from(next));
        while self.recent_blockhashes.len() > RECENT_BLOCKHASHES {
            self.recent_blockhashes.pop_front();
        }
    }

    fn account_mut(&mut self, key: &PublicKey) -> Result<&mut StoredAccount, LedgerError> {
        self.accounts.get_mut(key).ok_or_else(|| LedgerError::AccountNotFound {
            account: key.to_string(),
        })
    }

    fn debit(&mut self, key: &PublicKey, lamports: u64) -> Result<(), LedgerError> {
        let account = self.account_mut(key)?;
        account.lamports = account
            .lamports
            .checked_sub(lamports)
            .ok_or_else(|| rejected(format!("insufficient lamports in {}", key)))?;
        Ok(())
    }

    fn token_mint_mut(&mut self, key: &PublicKey) -> Result<&mut TokenMint, LedgerError> {
        match &mut self.account_mut(key)?.data {
            AccountData::Mint(mint) => Ok(mint),
            _ => Err(rejected(format!("{} is not a mint", key))),
        }
    }

    /// Checks that `signed` authorizes `authority`, directly or through the
    /// multisig stored at `authority`.
    fn authorize(
        &self,
        authority: &PublicKey,
        multisig_signers: &[PublicKey],
        signed: &[PublicKey],
    ) -> Result<(), LedgerError> {
        match self.accounts.get(authority).map(|a| &a.data) {
            Some(AccountData::Multisig(multisig)) => {
                let mut approvals: Vec<PublicKey> = Vec::new();
                for key in multisig_signers {
                    if !multisig.signers.contains(key) {
                        return Err(rejected(format!("{} is not a member of {}", key, authority)));
                    }
                    if signed.contains(key) && !approvals.contains(key) {
                        approvals.push(*key);
                    }
                }
                if approvals.len() < usize::from(multisig.threshold) {
                    return Err(rejected(format!(
                        "multisig {} needs {} signatures, got {}",
                        authority,
                        multisig.threshold,
                        approvals.len()
                    )));
                }
                Ok(())
            }
            _ if signed.contains(authority) => Ok(()),
            _ => Err(rejected(format!("missing signature for {}", authority))),
        }
    }

    fn require_uninitialized(
        &self,
        key: &PublicKey,
        expected_len: usize,
    ) -> Result<(), LedgerError> {
        match self.accounts.get(key) {
            Some(account)
                if account.owner == AccountOwner::TokenProgram
                    && account.data_len == expected_len
                    && matches!(account.data, AccountData::Uninitialized) =>
            {
                Ok(())
            }
            Some(_) => Err(rejected(format!("{} cannot be initialized", key))),
            None => Err(LedgerError::AccountNotFound {
                account: key.to_string(),
            }),
        }
    }

    fn apply(&mut self, instruction: &MintInstruction, signed: &[PublicKey]) -> Result<(), LedgerError> {
        match instruction {
            MintInstruction::CreateAccount {
                funder,
                new_account,
                lamports,
                space,
                owner,
            } => {
                if self.accounts.contains_key(new_account) {
                    return Err(rejected(format!("account {} already in use", new_account)));
                }
                if *lamports < rent_exempt_minimum(*space) {
                    return Err(rejected(format!("{} lamports not rent exempt for {} bytes", lamports, space)));
                }
                self.debit(funder, *lamports)?;
                self.accounts.insert(
                    *new_account,
                    StoredAccount {
                        owner: *owner,
                        lamports: *lamports,
                        data_len: *space,
                        data: AccountData::Uninitialized,
                    },
                );
            }
            MintInstruction::InitializeMint {
                mint,
                decimals,
                mint_authority,
                freeze_authority,
            } => {
                self.require_uninitialized(mint, MINT_SIZE)?;
                self.account_mut(mint)?.data = AccountData::Mint(TokenMint {
                    mint_authority: Some(*mint_authority),
                    freeze_authority: *freeze_authority,
                    supply: 0,
                    decimals: *decimals,
                });
            }
            MintInstruction::InitializeMultisig {
                multisig,
                signers,
                threshold,
            } => {
                self.require_uninitialized(multisig, MULTISIG_SIZE)?;
                if signers.is_empty() || signers.len() > MAX_MULTISIG_SIGNERS {
                    return Err(rejected(format!("invalid multisig size {}", signers.len())));
                }
                if *threshold == 0 || usize::from(*threshold) > signers.len() {
                    return Err(rejected(format!("invalid multisig threshold {}", threshold)));
                }
                self.account_mut(multisig)?.data = AccountData::Multisig(Multisig {
                    threshold: *threshold,
                    signers: signers.clone(),
                });
            }
            MintInstruction::SetAuthority {
                account,
                authority_type,
                new_authority,
                current_authority,
                multisig_signers,
            } => {
                self.authorize(current_authority, multisig_signers, signed)?;
                let mint = self.token_mint_mut(account)?;
                let slot = match authority_type {
                    AuthorityType::MintTokens => &mut mint.mint_authority,
                    AuthorityType::FreezeAccount => &mut mint.freeze_authority,
                };
                if *slot != Some(*current_authority) {
                    return Err(rejected(format!("{} is not the current authority", current_authority)));
                }
                *slot = *new_authority;
            }
            MintInstruction::MintTo {
                mint,
                destination,
                authority,
                amount,
                multisig_signers,
            } => {
                self.authorize(authority, multisig_signers, signed)?;
                let token_mint = self.token_mint_mut(mint)?;
                if token_mint.mint_authority != Some(*authority) {
                    return Err(rejected(format!("{} is not the mint authority of {}", authority, mint)));
                }
                token_mint.supply = token_mint
                    .supply
                    .checked_add(*amount)
                    .ok_or_else(|| rejected("supply overflow"))?;
                let balance = self.token_balances.entry((*mint, *destination)).or_insert(0);
                *balance = balance.checked_add(*amount).ok_or_else(|| rejected("balance overflow"))?;
            }
        }
        Ok(())
    }
}

pub struct InMemoryMintLedger {
    state: Mutex<MintState>,
}

impl InMemoryMintLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MintState::genesis()),
        }
    }

    /// Credit `lamports` to `key`, creating a system account if needed.
    pub async fn airdrop(&self, key: PublicKey, lamports: u64) {
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(key).or_insert(StoredAccount {
            owner: AccountOwner::System,
            lamports: 0,
            data_len: 0,
            data: AccountData::Uninitialized,
        });
        account.lamports = account.lamports.saturating_add(lamports);
    }

    pub async fn token_balance(&self, mint: &PublicKey, owner: &PublicKey) -> u64 {
        let state = self.state.lock().await;
        state.token_balances.get(&(*mint, *owner)).copied().unwrap_or(0)
    }

    pub async fn lamports(&self, key: &PublicKey) -> u64 {
        let state = self.state.lock().await;
        state.accounts.get(key).map(|a| a.lamports).unwrap_or(0)
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

impl Default for InMemoryMintLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MintLedger for InMemoryMintLedger {
    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        Ok(self.state.lock().await.latest_blockhash())
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, LedgerError> {
        Ok(rent_exempt_minimum(data_len))
    }

    async fn get_mint(&self, address: &PublicKey) -> Result<MintInfo, LedgerError> {
        let state = self.state.lock().await;
        match state.accounts.get(address).map(|a| &a.data) {
            Some(AccountData::Mint(mint)) => Ok(MintInfo {
                address: *address,
                mint_authority: mint.mint_authority,
                freeze_authority: mint.freeze_authority,
                supply: mint.supply,
                decimals: mint.decimals,
                is_initialized: true,
            }),
            _ => Err(LedgerError::NotFound {
                what: format!("mint {}", address),
            }),
        }
    }

    async fn get_account_info(&self, address: &PublicKey) -> Result<Option<AccountInfo>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(address).map(|a| AccountInfo {
            address: *address,
            owner: a.owner,
            lamports: a.lamports,
            data_len: a.data_len,
        }))
    }

    async fn get_multisig(&self, address: &PublicKey) -> Result<MultisigInfo, LedgerError> {
        let state = self.state.lock().await;
        match state.accounts.get(address).map(|a| &a.data) {
            Some(AccountData::Multisig(multisig)) => {
                let mut signers = multisig.signers.clone();
                signers.resize(MAX_MULTISIG_SIGNERS, PublicKey::SYSTEM);
                Ok(MultisigInfo {
                    address: *address,
                    threshold: multisig.threshold,
                    signers,
                    is_initialized: true,
                })
            }
            _ => Err(LedgerError::NotFound {
                what: format!("multisig {}", address),
            }),
        }
    }

    async fn get_transaction(&self, id: &SignatureBytes) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        Ok(self.state.lock().await.transactions.get(id).cloned())
    }

    async fn send_transaction(&self, transaction: MintTransaction) -> Result<SignatureBytes, LedgerError> {
        let mut state = self.state.lock().await;

        if !state.recent_blockhashes.contains(&transaction.recent_blockhash) {
            return Err(rejected(format!("blockhash not found: {}", transaction.recent_blockhash)));
        }
        if !transaction.verify_signatures() {
            warn!(pending = transaction.pending_signers().len(), "Rejected mint transaction with missing or invalid signatures");
            return Err(rejected("signature verification failed"));
        }
        let id = transaction
            .id()
            .ok_or_else(|| rejected("transaction has no fee payer signature"))?;
        if state.transactions.contains_key(&id) {
            return Err(rejected(format!("transaction already processed: {}", id)));
        }

        let signed = transaction.signers();
        let fee = LAMPORTS_PER_SIGNATURE * signed.len() as u64;

        let mut next = (*state).clone();
        next.debit(&transaction.fee_payer, fee)?;
        for (index, instruction) in transaction.instructions.iter().enumerate() {
            next.apply(instruction, &signed)
                .inspect_err(|e| warn!(tx = %id, index, error = %e, "Mint instruction failed"))?;
        }
        next.advance_slot();
        let slot = next.slot;
        next.transactions.insert(
            id,
            ConfirmedTransaction {
                slot,
                transaction: transaction.clone(),
            },
        );
        *state = next;

        debug!(tx = %id, slot, instructions = transaction.instructions.len(), "Confirmed mint transaction");
        Ok(id)
    }
}
