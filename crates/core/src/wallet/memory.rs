//! In-memory storage adapter.
//!
//! Behaves like the relational store where the engine can observe it: unique
//! `(user, currency)` wallets, unique transaction IDs, a non-negative balance check,
//! per-row exclusive locks held until the unit of work ends, and writes that become
//! visible only on commit. Used by tests and by the API test harness.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;

use purse_shared::types::{CurrencyCode, TransactionId, UserId, WalletId};

use super::error::StoreError;
use super::model::{Wallet, WalletTransaction};
use super::ports::{TransactionLedger, UnitOfWork, UnitOfWorkFactory, WalletStore};

/// Shared in-memory store. Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<State>,
}

#[derive(Debug, Default)]
struct State {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<WalletId, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<WalletId, Wallet>,
    owners: HashMap<(UserId, CurrencyCode), WalletId>,
    transactions: Vec<WalletTransaction>,
    transaction_ids: HashSet<TransactionId>,
}

impl Tables {
    fn insert_transaction(&mut self, transaction: &WalletTransaction) -> Result<(), StoreError> {
        if !self.wallets.contains_key(&transaction.wallet_id) {
            return Err(StoreError::Backend(format!(
                "wallet {} does not exist",
                transaction.wallet_id
            )));
        }
        if !self.transaction_ids.insert(transaction.id) {
            return Err(StoreError::Duplicate(format!(
                "transaction {}",
                transaction.id
            )));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    fn newest_first<'a>(
        rows: impl Iterator<Item = &'a WalletTransaction>,
        offset: u64,
        limit: u64,
    ) -> Vec<WalletTransaction> {
        let mut rows: Vec<_> = rows.collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.state.tables.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.state.tables.write().map_err(poisoned)
    }

    /// Number of wallets stored.
    #[must_use]
    pub fn wallet_count(&self) -> usize {
        self.read().map_or(0, |t| t.wallets.len())
    }

    /// Every committed transaction of one wallet, in commit order.
    #[must_use]
    pub fn transactions_of(&self, wallet_id: WalletId) -> Vec<WalletTransaction> {
        self.read().map_or_else(
            |_| Vec::new(),
            |t| {
                t.transactions
                    .iter()
                    .filter(|tx| tx.wallet_id == wallet_id)
                    .cloned()
                    .collect()
            },
        )
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.state.row_locks.lock().map_or(0, |locks| locks.len())
    }

    /// Number of committed transactions across all wallets.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.read().map_or(0, |t| t.transactions.len())
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn find_by_id(&self, id: WalletId) -> Result<Wallet, StoreError> {
        self.read()?
            .wallets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_owner(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> Result<Wallet, StoreError> {
        let tables = self.read()?;
        tables
            .owners
            .get(&(user_id, currency.clone()))
            .and_then(|id| tables.wallets.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        if wallet.balance < Decimal::ZERO {
            return Err(StoreError::Backend("balance must not be negative".to_string()));
        }
        let mut tables = self.write()?;
        let owner = (wallet.user_id, wallet.currency.clone());
        if tables.owners.contains_key(&owner) || tables.wallets.contains_key(&wallet.id) {
            return Err(StoreError::Duplicate(format!(
                "wallet for user {} in {}",
                wallet.user_id, wallet.currency
            )));
        }
        tables.owners.insert(owner, wallet.id);
        tables.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }
}

#[async_trait]
impl TransactionLedger for InMemoryStore {
    async fn append(&self, transaction: &WalletTransaction) -> Result<(), StoreError> {
        self.write()?.insert_transaction(transaction)
    }

    async fn find_by_id(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError> {
        Ok(self
            .read()?
            .transactions
            .iter()
            .find(|tx| tx.id == id)
            .cloned())
    }

    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let tables = self.read()?;
        Ok(Tables::newest_first(
            tables.transactions.iter().filter(|tx| tx.wallet_id == wallet_id),
            offset,
            limit,
        ))
    }

    async fn list_by_owner(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let tables = self.read()?;
        Ok(Tables::newest_first(
            tables.transactions.iter().filter(|tx| tx.user_id == user_id),
            offset,
            limit,
        ))
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnit {
            store: self.clone(),
            held: HashMap::new(),
            wallets: HashMap::new(),
            transactions: Vec::new(),
        }))
    }
}

/// Unit of work over [`InMemoryStore`]. Staged writes are discarded on drop.
struct MemoryUnit {
    store: InMemoryStore,
    held: HashMap<WalletId, OwnedMutexGuard<()>>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: Vec<WalletTransaction>,
}

impl Drop for MemoryUnit {
    /// Releases the row locks and forgets rows nobody else holds or waits on.
    fn drop(&mut self) {
        let released: Vec<WalletId> = self.held.drain().map(|(id, _guard)| id).collect();
        let Ok(mut locks) = self.store.state.row_locks.lock() else {
            return;
        };
        for id in released {
            if locks.get(&id).is_some_and(|row| Arc::strong_count(row) == 1) {
                locks.remove(&id);
            }
        }
    }
}

impl MemoryUnit {
    async fn acquire(&mut self, id: WalletId) -> Result<(), StoreError> {
        if self.held.contains_key(&id) {
            return Ok(());
        }
        let row = {
            let mut locks = self.store.state.row_locks.lock().map_err(poisoned)?;
            Arc::clone(locks.entry(id).or_default())
        };
        let guard = row.lock_owned().await;
        self.held.insert(id, guard);
        Ok(())
    }

    fn current(&self, id: WalletId) -> Result<Option<Wallet>, StoreError> {
        if let Some(staged) = self.wallets.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.read()?.wallets.get(&id).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_wallet(&mut self, id: WalletId) -> Result<Wallet, StoreError> {
        self.acquire(id).await?;
        self.current(id)?.ok_or(StoreError::NotFound)
    }

    async fn conditional_update_balance(
        &mut self,
        id: WalletId,
        new_balance: Decimal,
        expected_version: i64,
    ) -> Result<u64, StoreError> {
        self.acquire(id).await?;
        let Some(wallet) = self.current(id)? else {
            return Ok(0);
        };
        if wallet.version != expected_version {
            return Ok(0);
        }
        if new_balance < Decimal::ZERO {
            return Err(StoreError::Backend(format!(
                "balance of wallet {id} must not be negative"
            )));
        }
        self.wallets
            .insert(id, wallet.advanced(new_balance, Utc::now()));
        Ok(1)
    }

    async fn append_transaction(
        &mut self,
        transaction: &WalletTransaction,
    ) -> Result<(), StoreError> {
        if self.transactions.iter().any(|tx| tx.id == transaction.id)
            || self.store.read()?.transaction_ids.contains(&transaction.id)
        {
            return Err(StoreError::Duplicate(format!(
                "transaction {}",
                transaction.id
            )));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.store.write()?;
        for tx in &self.transactions {
            if tables.transaction_ids.contains(&tx.id) {
                return Err(StoreError::Duplicate(format!("transaction {}", tx.id)));
            }
            if !tables.wallets.contains_key(&tx.wallet_id) {
                return Err(StoreError::Backend(format!(
                    "wallet {} does not exist",
                    tx.wallet_id
                )));
            }
        }
        for (id, wallet) in &self.wallets {
            tables.wallets.insert(*id, wallet.clone());
        }
        for tx in &self.transactions {
            tables.insert_transaction(tx)?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::model::TransactionKind;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    async fn seeded(store: &InMemoryStore, balance: Decimal) -> Wallet {
        let mut wallet = Wallet::open(UserId::new(), usd());
        wallet.balance = balance;
        store.create(wallet).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_second_wallet_for_owner() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, Decimal::ZERO).await;

        let twin = Wallet::open(wallet.user_id, usd());
        let err = store.create(twin).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.wallet_count(), 1);
    }

    #[tokio::test]
    async fn test_find_by_owner_missing() {
        let store = InMemoryStore::new();
        let err = store.find_by_owner(UserId::new(), &usd()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_conditional_update_requires_matching_version() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, dec!(10)).await;

        let mut unit = store.begin().await.unwrap();
        let stale = unit
            .conditional_update_balance(wallet.id, dec!(20), wallet.version + 1)
            .await
            .unwrap();
        assert_eq!(stale, 0);
        let rows = unit
            .conditional_update_balance(wallet.id, dec!(20), wallet.version)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        unit.commit().await.unwrap();

        let stored = WalletStore::find_by_id(&store, wallet.id).await.unwrap();
        assert_eq!(stored.balance, dec!(20));
        assert_eq!(stored.version, wallet.version + 1);
    }

    #[tokio::test]
    async fn test_negative_balance_is_rejected() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, dec!(10)).await;

        let mut unit = store.begin().await.unwrap();
        let err = unit
            .conditional_update_balance(wallet.id, dec!(-1), wallet.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_writes() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, dec!(10)).await;

        {
            let mut unit = store.begin().await.unwrap();
            unit.conditional_update_balance(wallet.id, dec!(99), wallet.version)
                .await
                .unwrap();
            let entry = WalletTransaction::record(&wallet, dec!(89), TransactionKind::Deposit, "").unwrap();
            unit.append_transaction(&entry).await.unwrap();
        }

        let stored = WalletStore::find_by_id(&store, wallet.id).await.unwrap();
        assert_eq!(stored.balance, dec!(10));
        assert_eq!(store.transaction_count(), 0);

        // The row lock went with the unit.
        let mut unit = store.begin().await.unwrap();
        assert_eq!(unit.lock_wallet(wallet.id).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, Decimal::ZERO).await;
        let entry = WalletTransaction::record(&wallet, dec!(1), TransactionKind::Deposit, "").unwrap();

        store.append(&entry).await.unwrap();
        let err = store.append(&entry).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let mut unit = store.begin().await.unwrap();
        let err = unit.append_transaction(&entry).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, Decimal::ZERO).await;
        let mut ids = Vec::new();
        for n in 0..5 {
            let mut entry =
                WalletTransaction::record(&wallet, dec!(1), TransactionKind::Deposit, "").unwrap();
            entry.created_at += chrono::Duration::seconds(n);
            ids.push(entry.id);
            store.append(&entry).await.unwrap();
        }

        let page = store.list_by_wallet(wallet.id, 1, 2).await.unwrap();
        let got: Vec<_> = page.iter().map(|tx| tx.id).collect();
        assert_eq!(got, vec![ids[3], ids[2]]);

        let all = store.list_by_owner(wallet.user_id, 0, 10).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4]);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_unit_until_commit() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, dec!(10)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_wallet(wallet.id).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut unit = store.begin().await.unwrap();
                unit.lock_wallet(wallet.id).await.unwrap()
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        first
            .conditional_update_balance(wallet.id, dec!(15), wallet.version)
            .await
            .unwrap();
        first.commit().await.unwrap();

        let seen = contender.await.unwrap();
        assert_eq!(seen.balance, dec!(15));
    }

    #[tokio::test]
    async fn test_released_row_locks_are_forgotten() {
        let store = InMemoryStore::new();
        let wallet = seeded(&store, dec!(10)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_wallet(wallet.id).await.unwrap();
        assert_eq!(store.row_lock_count(), 1);

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut unit = store.begin().await.unwrap();
                unit.lock_wallet(wallet.id).await.unwrap();
                unit.rollback().await.unwrap();
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        first.commit().await.unwrap();
        contender.await.unwrap();
        assert_eq!(store.row_lock_count(), 0);

        let unit = store.begin().await.unwrap();
        drop(unit);
        let mut dropped = store.begin().await.unwrap();
        dropped.lock_wallet(wallet.id).await.unwrap();
        drop(dropped);
        assert_eq!(store.row_lock_count(), 0);
    }
}
