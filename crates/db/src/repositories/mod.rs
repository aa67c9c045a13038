//! Repository abstractions for data access.
//!
//! Repositories implement the balance engine's storage ports on top of `SeaORM`,
//! hiding the query details from the rest of the application.

pub mod transaction;
pub mod wallet;

pub use transaction::TransactionRepository;
pub use wallet::WalletRepository;

use purse_core::wallet::StoreError;
use sea_orm::{DbErr, SqlErr};

/// Maps a database error onto the storage port taxonomy.
///
/// Unique violations become [`StoreError::Duplicate`] so callers can tell a lost
/// creation race apart from a real failure.
pub(crate) fn store_error(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return StoreError::Duplicate(detail);
    }
    match err {
        DbErr::RecordNotFound(_) => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

/// Reports a row whose stored value no longer parses into a domain type.
pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {what}: {detail}"))
}
