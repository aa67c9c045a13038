//! Wallet transaction repository.
//!
//! The ledger table is append-only: rows are inserted and read, never updated or
//! deleted (a database trigger enforces this).

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use purse_core::wallet::{StoreError, TransactionLedger, WalletTransaction};
use purse_shared::types::{CurrencyCode, TransactionId, UserId, WalletId};

use super::{corrupt, store_error};
use crate::entities::wallet_transactions;

/// Wallet transaction repository.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    db: DatabaseConnection,
}

impl TransactionRepository {
    /// Creates a new transaction repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a ledger row on the pool or inside an open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including a duplicate ID.
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        transaction: &WalletTransaction,
    ) -> Result<(), DbErr> {
        let row = wallet_transactions::ActiveModel {
            id: Set(transaction.id.into_inner()),
            wallet_id: Set(transaction.wallet_id.into_inner()),
            user_id: Set(transaction.user_id.into_inner()),
            currency: Set(transaction.currency.to_string()),
            amount: Set(transaction.amount),
            balance_before: Set(transaction.balance_before),
            balance_after: Set(transaction.balance_after),
            kind: Set(transaction.kind.into()),
            related_tx_id: Set(transaction.related_tx_id.map(TransactionId::into_inner)),
            reference: Set(transaction.reference.clone()),
            created_at: Set(transaction.created_at.into()),
        };

        wallet_transactions::Entity::insert(row)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: sea_orm::Condition,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        wallet_transactions::Entity::find()
            .filter(filter)
            .order_by_desc(wallet_transactions::Column::CreatedAt)
            .order_by_desc(wallet_transactions::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(to_transaction)
            .collect()
    }
}

/// Converts a ledger row into the domain type.
pub(crate) fn to_transaction(
    model: wallet_transactions::Model,
) -> Result<WalletTransaction, StoreError> {
    let currency = CurrencyCode::parse(&model.currency)
        .map_err(|e| corrupt("transaction currency", e))?;
    Ok(WalletTransaction {
        id: TransactionId::from_uuid(model.id),
        wallet_id: WalletId::from_uuid(model.wallet_id),
        user_id: UserId::from_uuid(model.user_id),
        currency,
        amount: model.amount,
        balance_before: model.balance_before,
        balance_after: model.balance_after,
        kind: model.kind.into(),
        related_tx_id: model.related_tx_id.map(TransactionId::from_uuid),
        reference: model.reference,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl TransactionLedger for TransactionRepository {
    async fn append(&self, transaction: &WalletTransaction) -> Result<(), StoreError> {
        Self::insert(&self.db, transaction)
            .await
            .map_err(store_error)
    }

    async fn find_by_id(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError> {
        wallet_transactions::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(to_transaction)
            .transpose()
    }

    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let filter = sea_orm::Condition::all()
            .add(wallet_transactions::Column::WalletId.eq(wallet_id.into_inner()));
        self.list(filter, offset, limit).await
    }

    async fn list_by_owner(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let filter = sea_orm::Condition::all()
            .add(wallet_transactions::Column::UserId.eq(user_id.into_inner()));
        self.list(filter, offset, limit).await
    }
}
