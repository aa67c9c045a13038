//! Wallet repository for database operations.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QuerySelect, Set,
};
use tracing::debug;

use purse_core::wallet::{StoreError, Wallet, WalletStore};
use purse_shared::types::{CurrencyCode, UserId, WalletId};

use super::{corrupt, store_error};
use crate::entities::wallets;

/// Wallet repository.
#[derive(Debug, Clone)]
pub struct WalletRepository {
    db: DatabaseConnection,
}

impl WalletRepository {
    /// Creates a new wallet repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Reads a wallet and takes an exclusive row lock (`SELECT ... FOR UPDATE`)
    /// held until `txn` ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn lock_for_update(
        txn: &DatabaseTransaction,
        id: WalletId,
    ) -> Result<Option<wallets::Model>, DbErr> {
        wallets::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(txn)
            .await
    }

    /// Sets the balance and bumps the version iff the stored version equals
    /// `expected_version`. Returns the number of rows changed.
    ///
    /// Works on the pool or inside an open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails, including the non-negative balance check.
    pub async fn conditional_update_balance<C: ConnectionTrait>(
        conn: &C,
        id: WalletId,
        new_balance: Decimal,
        expected_version: i64,
    ) -> Result<u64, DbErr> {
        let result = wallets::Entity::update_many()
            .col_expr(wallets::Column::Balance, Expr::value(new_balance))
            .col_expr(
                wallets::Column::Version,
                Expr::col(wallets::Column::Version).add(1),
            )
            .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallets::Column::Id.eq(id.into_inner()))
            .filter(wallets::Column::Version.eq(expected_version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            debug!(wallet_id = %id, expected_version, "Conditional update matched no row");
        }
        Ok(result.rows_affected)
    }
}

/// Converts a wallet row into the domain type.
pub(crate) fn to_wallet(model: wallets::Model) -> Result<Wallet, StoreError> {
    let currency =
        CurrencyCode::parse(&model.currency).map_err(|e| corrupt("wallet currency", e))?;
    Ok(Wallet {
        id: WalletId::from_uuid(model.id),
        user_id: UserId::from_uuid(model.user_id),
        currency,
        balance: model.balance,
        version: model.version,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl WalletStore for WalletRepository {
    async fn find_by_id(&self, id: WalletId) -> Result<Wallet, StoreError> {
        wallets::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::NotFound)
            .and_then(to_wallet)
    }

    async fn find_by_owner(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> Result<Wallet, StoreError> {
        wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_id.into_inner()))
            .filter(wallets::Column::Currency.eq(currency.as_str()))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::NotFound)
            .and_then(to_wallet)
    }

    async fn create(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        let model = wallets::ActiveModel {
            id: Set(wallet.id.into_inner()),
            user_id: Set(wallet.user_id.into_inner()),
            currency: Set(wallet.currency.to_string()),
            balance: Set(wallet.balance),
            version: Set(wallet.version),
            created_at: Set(wallet.created_at.into()),
            updated_at: Set(wallet.updated_at.into()),
        };

        let inserted = model.insert(&self.db).await.map_err(store_error)?;
        to_wallet(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn row(currency: &str) -> wallets::Model {
        let now = Utc::now().into();
        wallets::Model {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            currency: currency.to_string(),
            balance: dec!(12.50000000),
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_to_wallet_maps_fields() {
        let model = row("USD");
        let wallet = to_wallet(model.clone()).unwrap();
        assert_eq!(wallet.id.into_inner(), model.id);
        assert_eq!(wallet.user_id.into_inner(), model.user_id);
        assert_eq!(wallet.currency.as_str(), "USD");
        assert_eq!(wallet.balance, dec!(12.5));
        assert_eq!(wallet.version, 4);
    }

    #[test]
    fn test_to_wallet_rejects_corrupt_currency() {
        let err = to_wallet(row("US1")).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
