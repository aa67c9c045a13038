//! Units of work backed by Postgres transactions.
//!
//! A dropped [`SeaOrmUnitOfWork`] rolls back, which is what a cancelled request
//! relies on.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use purse_core::wallet::{StoreError, UnitOfWork, UnitOfWorkFactory, Wallet, WalletTransaction};
use purse_shared::types::WalletId;

use crate::repositories::wallet::to_wallet;
use crate::repositories::{TransactionRepository, WalletRepository, store_error};

/// Opens a database transaction per unit of work.
#[derive(Debug, Clone)]
pub struct SeaOrmUnits {
    db: DatabaseConnection,
}

impl SeaOrmUnits {
    /// Creates a factory over the connection pool.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UnitOfWorkFactory for SeaOrmUnits {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;
        Ok(Box::new(SeaOrmUnitOfWork { txn }))
    }
}

/// One open database transaction.
#[derive(Debug)]
pub struct SeaOrmUnitOfWork {
    txn: DatabaseTransaction,
}

#[async_trait]
impl UnitOfWork for SeaOrmUnitOfWork {
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Wallet, StoreError> {
        WalletRepository::lock_for_update(&self.txn, id)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::NotFound)
            .and_then(to_wallet)
    }

    async fn conditional_update_balance(
        &mut self,
        id: WalletId,
        new_balance: Decimal,
        expected_version: i64,
    ) -> Result<u64, StoreError> {
        WalletRepository::conditional_update_balance(&self.txn, id, new_balance, expected_version)
            .await
            .map_err(store_error)
    }

    async fn append_transaction(
        &mut self,
        transaction: &WalletTransaction,
    ) -> Result<(), StoreError> {
        TransactionRepository::insert(&self.txn, transaction)
            .await
            .map_err(store_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(store_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await.map_err(store_error)
    }
}
