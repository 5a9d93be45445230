//! In-memory [`AccountStore`] with optimistic concurrency control.
//!
//! Every committed account carries a version. A context records the version
//! of each account the first time it touches it and stages its writes
//! locally. On commit, under the store's write lock, every recorded version
//! is compared with the current one (compare-and-swap); any mismatch fails
//! the commit with [`StoreError::Conflict`] and nothing is applied.

use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{AccountStore, StoreError};
use crate::Amount;
use crate::model::{Account, UserId};

#[derive(Debug, Clone, Copy)]
struct Record {
    balance: Amount,
    version: u64,
}

/// Shared, cloneable handle to an in-memory account table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<UserId, Record>>>,
    next_tx: Arc<AtomicU64>,
}

/// One account as seen from inside a context.
#[derive(Debug)]
struct Slot {
    /// Committed version when first read, `None` if the account was absent.
    seen: Option<u64>,
    balance: Option<Amount>,
    dirty: bool,
}

/// Transactional context of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    id: u64,
    slots: HashMap<UserId, Slot>,
    poisoned: bool,
}

impl MemoryTx {
    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Aborted);
        }
        Ok(())
    }

    fn staged(&self) -> usize {
        self.slots.values().filter(|s| s.dirty).count()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed accounts, sorted by owner.
    pub async fn snapshot(&self) -> Vec<Account> {
        let accounts = self.accounts.read().await;
        let mut out: Vec<Account> = accounts
            .iter()
            .map(|(owner, record)| Account {
                owner: *owner,
                balance: record.balance,
            })
            .collect();
        out.sort_by_key(|a| a.owner);
        out
    }

    /// Sum of all committed balances, `None` if it does not fit an [`Amount`].
    pub async fn total_balance(&self) -> Option<Amount> {
        self.accounts
            .read()
            .await
            .values()
            .try_fold(Amount::ZERO, |total, r| total.checked_add(r.balance))
    }

    /// Slot for `owner` in `tx`, reading the committed record on first use.
    async fn slot<'a>(&self, tx: &'a mut MemoryTx, owner: UserId) -> &'a mut Slot {
        match tx.slots.entry(owner) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let record = self.accounts.read().await.get(&owner).copied();
                trace!(tx = tx.id, owner = %owner, version = ?record.map(|r| r.version), "read");
                entry.insert(Slot {
                    seen: record.map(|r| r.version),
                    balance: record.map(|r| r.balance),
                    dirty: false,
                })
            }
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        trace!(tx = id, "begin");
        Ok(MemoryTx {
            id,
            slots: HashMap::new(),
            poisoned: false,
        })
    }

    async fn get(&self, tx: &mut MemoryTx, owner: UserId) -> Result<Option<Account>, StoreError> {
        tx.ensure_usable()?;
        let slot = self.slot(tx, owner).await;
        Ok(slot.balance.map(|balance| Account { owner, balance }))
    }

    async fn create_account(
        &self,
        tx: &mut MemoryTx,
        owner: UserId,
        initial_balance: Amount,
    ) -> Result<Account, StoreError> {
        tx.ensure_usable()?;
        if initial_balance.is_negative() {
            tx.poisoned = true;
            return Err(StoreError::NegativeBalance(owner));
        }
        let slot = self.slot(tx, owner).await;
        if slot.balance.is_some() {
            return Err(StoreError::AccountExists(owner));
        }
        slot.balance = Some(initial_balance);
        slot.dirty = true;
        Ok(Account {
            owner,
            balance: initial_balance,
        })
    }

    async fn apply_delta(
        &self,
        tx: &mut MemoryTx,
        owner: UserId,
        delta: Amount,
    ) -> Result<Account, StoreError> {
        tx.ensure_usable()?;
        let slot = self.slot(tx, owner).await;
        let current = slot.balance.ok_or(StoreError::AccountNotFound(owner))?;
        let updated = match current.checked_add(delta) {
            Some(b) if b.is_negative() => Err(StoreError::NegativeBalance(owner)),
            Some(b) => Ok(b),
            None => Err(StoreError::Overflow(owner)),
        };
        match updated {
            Ok(balance) => {
                slot.balance = Some(balance);
                slot.dirty = true;
                Ok(Account { owner, balance })
            }
            Err(e) => {
                tx.poisoned = true;
                Err(e)
            }
        }
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), StoreError> {
        tx.ensure_usable()?;
        if tx.staged() == 0 {
            trace!(tx = tx.id, "read-only commit");
            return Ok(());
        }

        let mut accounts = self.accounts.write().await;

        // validate everything before applying anything
        for (owner, slot) in &tx.slots {
            let current = accounts.get(owner).map(|r| r.version);
            if current != slot.seen {
                debug!(tx = tx.id, owner = %owner, "commit conflict");
                return Err(match (slot.seen, slot.dirty) {
                    (None, true) => StoreError::AccountExists(*owner),
                    _ => StoreError::Conflict(*owner),
                });
            }
            if slot.dirty {
                match slot.balance {
                    Some(b) if b.is_negative() => return Err(StoreError::NegativeBalance(*owner)),
                    None => return Err(StoreError::AccountNotFound(*owner)),
                    Some(_) => {}
                }
            }
        }

        let staged = tx.staged();
        for (owner, slot) in tx.slots {
            let (true, Some(balance)) = (slot.dirty, slot.balance) else {
                continue;
            };
            accounts
                .entry(owner)
                .and_modify(|r| {
                    r.balance = balance;
                    r.version += 1;
                })
                .or_insert(Record {
                    balance,
                    version: 1,
                });
        }
        debug!(tx = tx.id, staged, "committed");
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) {
        debug!(tx = tx.id, staged = tx.staged(), "rolled back");
    }
}
