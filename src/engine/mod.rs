//! Transfer engine.
//!
//! The engine moves funds between two accounts as one all-or-nothing unit.
//! It keeps no state of its own between requests: every transfer opens a
//! fresh transactional context on the [`AccountStore`], re-reads both
//! accounts inside it and relies on the store's commit-time validation to
//! reject transfers that raced on the same account.
//! Also supports running an async stream of transfers concurrently.

use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::Amount;
use crate::config::EngineConfig;
use crate::model::{Account, TransferCommand, TransferRequest, TransferStage, UserId};
use crate::store::{AccountStore, StoreError};

mod error;
pub use error::{AccountError, TransferError, ValidationError};

/// The transfer engine, generic over its account store.
pub struct Engine<S> {
    store: S,
    config: EngineConfig,
}

/// Outcome counts of [`Engine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    /// Refused because of the request itself (client errors).
    pub rejected: usize,
    /// Failed on the server side; a retry may succeed.
    pub failed: usize,
}

/// Public API
impl<S: AccountStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the account of a newly registered user, seeded with a random
    /// balance in `[1, 10001)`.
    pub async fn open_account(&self, owner: UserId) -> Result<Account, AccountError> {
        let initial = {
            let mut rng = rand::thread_rng();
            Amount::from_float(rng.gen_range(1.0..10_001.0))
        };
        self.open_account_with_balance(owner, initial).await
    }

    /// Create `owner`'s account with an explicit initial balance.
    pub async fn open_account_with_balance(
        &self,
        owner: UserId,
        initial: Amount,
    ) -> Result<Account, AccountError> {
        let mut tx = self.store.begin().await?;
        let account = match self.store.create_account(&mut tx, owner, initial).await {
            Ok(account) => account,
            Err(e) => {
                self.store.rollback(tx).await;
                return Err(e.into());
            }
        };
        self.store.commit(tx).await?;
        info!(owner = %owner, balance = %account.balance, "account opened");
        Ok(account)
    }

    /// Current committed balance of `owner`.
    pub async fn balance(&self, owner: UserId) -> Result<Amount, AccountError> {
        let mut tx = self.store.begin().await?;
        let account = self.store.get(&mut tx, owner).await;
        self.store.rollback(tx).await;
        account?
            .map(|a| a.balance)
            .ok_or(AccountError::NotFound(owner))
    }

    /// Move `amount` from the authenticated `caller` to the user `to`.
    ///
    /// Input is validated before the store is touched. On any error the
    /// store is left exactly as if the call never happened.
    pub async fn transfer(&self, caller: UserId, to: &str, amount: f64) -> Result<(), TransferError> {
        debug!(from = %caller, stage = %TransferStage::Validating, "transfer stage");
        match TransferRequest::parse(caller, to, amount) {
            Ok(request) => self.execute(request).await,
            Err(e) => {
                debug!(from = %caller, stage = %TransferStage::Aborted, "transfer stage");
                info!(
                    from = %caller,
                    to = %to,
                    amount = %amount,
                    reason = %e,
                    "transfer rejected"
                );
                Err(e.into())
            }
        }
    }

    /// Execute an already validated request, bounded by the configured
    /// timeout. No automatic retry.
    pub async fn execute(&self, request: TransferRequest) -> Result<(), TransferError> {
        let timeout = self.config.transfer_timeout;
        // on timeout the attempt future is dropped together with its context
        let result = match tokio::time::timeout(timeout, self.attempt(&request)).await {
            Ok(result) => result,
            Err(_) => {
                Self::enter(&request, TransferStage::Aborted);
                Err(TransferError::TimedOut(timeout))
            }
        };
        Self::log_result(&request, &result);
        result
    }
}

impl<S: AccountStore> Engine<S> {
    /// Run the given stream of transfers, one task per transfer, and wait
    /// for all of them. A failing transfer never stops the others.
    pub async fn run(
        self: Arc<Self>,
        mut stream: impl Stream<Item = TransferCommand> + Unpin,
    ) -> RunSummary {
        let mut tasks = JoinSet::new();
        while let Some(command) = stream.next().await {
            let engine = Arc::clone(&self);
            tasks.spawn(async move {
                engine
                    .transfer(command.from, &command.to, command.amount)
                    .await
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => summary.applied += 1,
                Ok(Err(e)) if e.is_client_error() => summary.rejected += 1,
                Ok(Err(_)) => summary.failed += 1,
                Err(e) => {
                    error!(reason = %e, "transfer task did not complete");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Private API
impl<S: AccountStore> Engine<S> {
    /// One transfer attempt inside a single transactional context.
    async fn attempt(&self, request: &TransferRequest) -> Result<(), TransferError> {
        let mut tx = self.store.begin().await?;
        let outcome = match self.stage_transfer(&mut tx, request).await {
            Ok(()) => {
                Self::enter(request, TransferStage::Committing);
                // a failed commit discards the context inside the store
                self.store.commit(tx).await.map_err(TransferError::from)
            }
            Err(e) => {
                self.store.rollback(tx).await;
                Err(e)
            }
        };
        let terminal = if outcome.is_ok() {
            TransferStage::Committed
        } else {
            TransferStage::Aborted
        };
        Self::enter(request, terminal);
        outcome
    }

    /// Load both accounts, check the balance and stage debit and credit:
    /// - Payee must exist
    /// - Caller must exist (an authenticated caller without account is an anomaly)
    /// - Caller balance must cover the amount on the current snapshot
    /// - Debit and credit go through the same context; the store re-checks
    ///   non-negativity and concurrent modification on commit
    async fn stage_transfer(
        &self,
        tx: &mut S::Tx,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        let (from, to, amount) = (request.from(), request.to(), request.amount());

        Self::enter(request, TransferStage::Loading);
        let payee = self
            .store
            .get(tx, to)
            .await?
            .ok_or(TransferError::PayeeNotFound(to))?;
        let payer = self
            .store
            .get(tx, from)
            .await?
            .ok_or(TransferError::AccountNotFound(from))?;

        Self::enter(request, TransferStage::BalanceChecking);
        if payer.balance < amount {
            return Err(TransferError::InsufficientBalance(
                from,
                payer.balance,
                amount,
            ));
        }

        Self::enter(request, TransferStage::Mutating);
        let debit = amount.checked_neg().ok_or(StoreError::Overflow(from))?;
        self.store.apply_delta(tx, payer.owner, debit).await?;
        self.store.apply_delta(tx, payee.owner, amount).await?;

        Ok(())
    }

    fn enter(request: &TransferRequest, stage: TransferStage) {
        debug!(
            from = %request.from(),
            to = %request.to(),
            stage = %stage,
            "transfer stage"
        );
    }

    /// Small helper to log `execute` results
    fn log_result(request: &TransferRequest, result: &Result<(), TransferError>) {
        let (from, to, amount) = (request.from(), request.to(), request.amount());
        match result {
            Ok(()) => {
                info!(from = %from, to = %to, amount = %amount, "transfer applied");
            }
            Err(e @ TransferError::AccountNotFound(_)) => {
                error!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    reason = %e,
                    "authenticated caller has no account"
                );
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    reason = %e,
                    "transfer failed"
                );
            }
            Err(e) => {
                info!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    reason = %e,
                    "transfer skipped"
                );
            }
        }
    }
}
