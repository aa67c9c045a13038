//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repositories implementing the balance engine's storage ports
//! - Units of work over Postgres transactions
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;
pub mod units;

pub use repositories::{TransactionRepository, WalletRepository};
pub use units::{SeaOrmUnitOfWork, SeaOrmUnits};

use std::sync::Arc;

use purse_core::wallet::{BalanceEngine, RetryPolicy};
use purse_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a pooled connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Builds a balance engine whose every port is backed by `db`.
#[must_use]
pub fn balance_engine(db: &DatabaseConnection, retry: RetryPolicy) -> BalanceEngine {
    BalanceEngine::new(
        Arc::new(WalletRepository::new(db.clone())),
        Arc::new(TransactionRepository::new(db.clone())),
        Arc::new(SeaOrmUnits::new(db.clone())),
        retry,
    )
}
