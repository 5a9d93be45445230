//! Core domain types for the wallet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Amount;
use crate::engine::ValidationError;

/// Identifier of a registered user, as handed out by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::MalformedUserId(s.to_string()))
    }
}

/// A user's wallet account. There is exactly one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub owner: UserId,
    pub balance: Amount,
}

/// A transfer as received from the request-handling layer: the caller is
/// already authenticated, the rest is raw input.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCommand {
    pub from: UserId,
    pub to: String,
    pub amount: f64,
}

impl TransferCommand {
    pub fn new(from: UserId, to: String, amount: f64) -> Self {
        Self { from, to, amount }
    }
}

/// A validated request to move `amount` from `from` to `to`.
///
/// Constructing one performs every local check, so a request that exists is
/// ready to be executed against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    from: UserId,
    to: UserId,
    amount: Amount,
}

impl TransferRequest {
    /// Validate raw inbound values from an authenticated caller.
    pub fn parse(from: UserId, to: &str, amount: f64) -> Result<Self, ValidationError> {
        let amount = Amount::try_from_float(amount).ok_or(ValidationError::InvalidAmount(amount))?;
        let to = to.parse()?;
        Self::new(from, to, amount)
    }

    pub fn new(from: UserId, to: UserId, amount: Amount) -> Result<Self, ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        if from == to {
            return Err(ValidationError::SelfTransfer(from));
        }
        Ok(Self { from, to, amount })
    }

    pub fn from(&self) -> UserId {
        self.from
    }

    pub fn to(&self) -> UserId {
        self.to
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

/// Progress of a single transfer attempt.
///
/// `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Validating,
    Loading,
    BalanceChecking,
    Mutating,
    Committing,
    Committed,
    Aborted,
}

impl TransferStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStage::Committed | TransferStage::Aborted)
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Validating => "validating",
            TransferStage::Loading => "loading",
            TransferStage::BalanceChecking => "balance-checking",
            TransferStage::Mutating => "mutating",
            TransferStage::Committing => "committing",
            TransferStage::Committed => "committed",
            TransferStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
