//! Balance engine error types.
//!
//! `StoreError` is what storage adapters report through the ports. `WalletError` is
//! the stable taxonomy the engine exposes; transports classify it with
//! [`WalletError::kind`] and never by parsing the message.

use rust_decimal::Decimal;
use thiserror::Error;

use purse_shared::AppError;
use purse_shared::types::WalletId;

/// Errors reported by storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Any other storage failure.
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Errors returned by the balance engine.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The request is malformed (non-positive amount, bad page bounds, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A lookup without implicit creation found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The debit would drive the balance negative.
    #[error("insufficient balance in wallet {wallet_id}: balance {balance}, requested {requested}")]
    InsufficientFund {
        /// Wallet that would be overdrawn.
        wallet_id: WalletId,
        /// Balance observed at the time of the check.
        balance: Decimal,
        /// Amount the caller tried to debit.
        requested: Decimal,
    },

    /// Optimistic retries were exhausted.
    #[error("balance update conflicted after {attempts} attempts")]
    Conflict {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Storage failure, commit failure, or any unexpected collaborator error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable classification of a [`WalletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletErrorKind {
    /// See [`WalletError::InvalidRequest`].
    InvalidRequest,
    /// See [`WalletError::NotFound`].
    NotFound,
    /// See [`WalletError::InsufficientFund`].
    InsufficientFund,
    /// See [`WalletError::Conflict`].
    Conflict,
    /// See [`WalletError::Internal`].
    Internal,
}

impl WalletErrorKind {
    /// Returns the error code used in API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::InsufficientFund => "INSUFFICIENT_FUND",
            Self::Conflict => "CONFLICT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl WalletError {
    /// Returns the stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> WalletErrorKind {
        match self {
            Self::InvalidRequest(_) => WalletErrorKind::InvalidRequest,
            Self::NotFound(_) => WalletErrorKind::NotFound,
            Self::InsufficientFund { .. } => WalletErrorKind::InsufficientFund,
            Self::Conflict { .. } => WalletErrorKind::Conflict,
            Self::Internal(_) => WalletErrorKind::Internal,
        }
    }

    /// Wraps a storage error raised while doing `context`.
    ///
    /// Only a missing row keeps its own kind; everything else is internal.
    pub(crate) fn storage(context: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound(context.to_string()),
            other => Self::Internal(format!("{context}: {other}")),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        let message = err.to_string();
        match err.kind() {
            WalletErrorKind::InvalidRequest => Self::Validation(message),
            WalletErrorKind::NotFound => Self::NotFound(message),
            WalletErrorKind::InsufficientFund => Self::InsufficientFund(message),
            WalletErrorKind::Conflict => Self::Conflict(message),
            WalletErrorKind::Internal => Self::Internal(message),
        }
    }
}
