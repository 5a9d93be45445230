//! Error types for transfer processing.

use std::time::Duration;
use thiserror::Error;

use crate::Amount;
use crate::model::UserId;
use crate::store::StoreError;

/// Malformed transfer input. Detected before any storage access.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("amount {0} is not a finite number in range")]
    InvalidAmount(f64),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("malformed user id '{0}'")]
    MalformedUserId(String),

    #[error("cannot transfer from account {0} to itself")]
    SelfTransfer(UserId),
}

/// Error returned by [`Engine::transfer`](super::Engine::transfer).
///
/// Whatever the variant, no part of the transfer is visible in the store.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid transfer: {0}")]
    Validation(#[from] ValidationError),

    #[error("payee account {0} not found")]
    PayeeNotFound(UserId),

    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("insufficient balance for {0}: available {1}, requested {2}")]
    InsufficientBalance(UserId, Amount, Amount),

    #[error("transfer failed: {0}")]
    Failed(#[from] StoreError),

    #[error("transfer failed: timed out after {0:?}")]
    TimedOut(Duration),
}

impl TransferError {
    /// Errors caused by the request itself rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TransferError::Validation(_)
                | TransferError::PayeeNotFound(_)
                | TransferError::InsufficientBalance(..)
        )
    }

    /// A fresh attempt of the same transfer may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Failed(_) | TransferError::TimedOut(_))
    }
}

/// Error from account registration and balance lookups.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account {0} not found")]
    NotFound(UserId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
