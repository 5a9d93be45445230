//! Account storage.
//!
//! The store owns every persisted balance. All access goes through an
//! explicit transactional context (`Tx`) opened with [`AccountStore::begin`]:
//! writes are staged in the context and become visible only on
//! [`AccountStore::commit`], all together. A context that is rolled back or
//! simply dropped leaves no trace.

use async_trait::async_trait;
use thiserror::Error;

use crate::Amount;
use crate::model::{Account, UserId};

mod memory;
pub use memory::{MemoryStore, MemoryTx};

/// Errors raised by an [`AccountStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} already exists")]
    AccountExists(UserId),

    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("balance of account {0} would become negative")]
    NegativeBalance(UserId),

    #[error("balance of account {0} would overflow")]
    Overflow(UserId),

    #[error("account {0} was modified by a concurrent transaction")]
    Conflict(UserId),

    #[error("transaction was aborted by an earlier failure")]
    Aborted,
}

/// Durable mapping from user to a non-negative balance.
///
/// Implementations must make committed contexts equivalent to some serial
/// order and must refuse any commit that would leave a negative balance.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Transactional context. Dropping it without committing rolls it back.
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Point read as seen by `tx`, including its own staged writes.
    async fn get(&self, tx: &mut Self::Tx, owner: UserId) -> Result<Option<Account>, StoreError>;

    /// Stage the creation of `owner`'s account. Fails with
    /// [`StoreError::AccountExists`] if the user already has one.
    async fn create_account(
        &self,
        tx: &mut Self::Tx,
        owner: UserId,
        initial_balance: Amount,
    ) -> Result<Account, StoreError>;

    /// Stage `balance += delta`. A negative result poisons the whole context.
    async fn apply_delta(
        &self,
        tx: &mut Self::Tx,
        owner: UserId,
        delta: Amount,
    ) -> Result<Account, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx);
}
