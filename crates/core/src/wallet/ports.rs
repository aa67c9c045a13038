//! Storage ports the balance engine depends on.
//!
//! Adapters implement these against a real store (see `purse-db`) or in memory
//! (see [`super::memory`]). The engine only ever talks to storage through them.

use async_trait::async_trait;
use rust_decimal::Decimal;

use purse_shared::types::{CurrencyCode, TransactionId, UserId, WalletId};

use super::error::StoreError;
use super::model::{Wallet, WalletTransaction};

/// Keyed storage for wallet rows.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Looks a wallet up by ID.
    async fn find_by_id(&self, id: WalletId) -> Result<Wallet, StoreError>;

    /// Looks a wallet up by its owner and currency.
    async fn find_by_owner(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> Result<Wallet, StoreError>;

    /// Inserts a new wallet and returns it as stored.
    ///
    /// Fails with [`StoreError::Duplicate`] when the owner already has a wallet in
    /// that currency.
    async fn create(&self, wallet: Wallet) -> Result<Wallet, StoreError>;
}

/// Append-only storage for ledger transactions.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Appends a transaction outside any unit of work.
    async fn append(&self, transaction: &WalletTransaction) -> Result<(), StoreError>;

    /// Looks a committed transaction up by ID.
    async fn find_by_id(&self, id: TransactionId)
    -> Result<Option<WalletTransaction>, StoreError>;

    /// Lists a wallet's transactions, newest first.
    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError>;

    /// Lists transactions across all of a user's wallets, newest first.
    async fn list_by_owner(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError>;
}

/// Opens units of work.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// Begins a new atomic scope.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// An atomic scope over several reads and writes.
///
/// Consumed by exactly one of [`commit`](UnitOfWork::commit) or
/// [`rollback`](UnitOfWork::rollback). Dropping it without committing rolls back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Reads a wallet and holds an exclusive lock on it until the unit ends.
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Wallet, StoreError>;

    /// Sets the balance and bumps the version iff the stored version equals
    /// `expected_version`. Returns the number of rows changed (0 or 1).
    ///
    /// Zero is not an error: it means the caller read a stale version.
    async fn conditional_update_balance(
        &mut self,
        id: WalletId,
        new_balance: Decimal,
        expected_version: i64,
    ) -> Result<u64, StoreError>;

    /// Appends a transaction inside this unit.
    async fn append_transaction(&mut self, transaction: &WalletTransaction)
    -> Result<(), StoreError>;

    /// Makes every write in this unit durable.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write in this unit.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
