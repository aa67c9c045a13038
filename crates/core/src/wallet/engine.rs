//! Balance engine: deposits, withdrawals, transfers and history.
//!
//! Single-wallet mutations use optimistic compare-and-swap on the wallet version,
//! each attempt in its own short unit of work. Transfers take exclusive row locks on
//! both wallets in ascending ID order and commit both legs together.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use purse_shared::types::{CurrencyCode, PageRequest, TransactionId, UserId, WalletId};

use super::error::{StoreError, WalletError};
use super::model::{
    Balance, MAX_BALANCE, TransactionKind, TransferReceipt, Wallet, WalletTransaction,
};
use super::ports::{TransactionLedger, UnitOfWork, UnitOfWorkFactory, WalletStore};
use super::retry::RetryPolicy;

/// Largest number of fractional digits an amount may carry.
pub const MAX_AMOUNT_SCALE: u32 = 8;

/// Orchestrates every balance mutation and query.
#[derive(Clone)]
pub struct BalanceEngine {
    wallets: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    units: Arc<dyn UnitOfWorkFactory>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BalanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BalanceEngine {
    /// Creates an engine over the given storage adapters.
    #[must_use]
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
        units: Arc<dyn UnitOfWorkFactory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            wallets,
            ledger,
            units,
            retry,
        }
    }

    /// Credits `amount` to the user's wallet, provisioning it on first use.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a non-positive amount, `Conflict` when every optimistic
    /// attempt lost, `Internal` on storage failure.
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        currency: &CurrencyCode,
        reference: &str,
    ) -> Result<Wallet, WalletError> {
        validate_amount(amount)?;
        let wallet = self.resolve_or_create(user_id, currency).await?;
        self.apply_with_retry(wallet, amount, TransactionKind::Deposit, reference)
            .await
    }

    /// Debits `amount` from the user's wallet, provisioning it on first use.
    ///
    /// # Errors
    ///
    /// As [`deposit`](Self::deposit), plus `InsufficientFund` when the balance read
    /// on any attempt is smaller than `amount`.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        currency: &CurrencyCode,
        reference: &str,
    ) -> Result<Wallet, WalletError> {
        validate_amount(amount)?;
        let wallet = self.resolve_or_create(user_id, currency).await?;
        self.apply_with_retry(wallet, -amount, TransactionKind::Withdrawal, reference)
            .await
    }

    /// Moves `amount` between two users' wallets as one atomic double entry.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a non-positive amount or a self-transfer,
    /// `InsufficientFund` when the locked source balance is too small, `Internal`
    /// on storage or commit failure.
    pub async fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        currency: &CurrencyCode,
        reference: &str,
    ) -> Result<TransferReceipt, WalletError> {
        validate_amount(amount)?;
        if from_user == to_user {
            return Err(WalletError::InvalidRequest(
                "cannot transfer to the same user".to_string(),
            ));
        }

        let from = self.resolve_or_create(from_user, currency).await?;
        let to = self.resolve_or_create(to_user, currency).await?;

        let mut unit = self
            .units
            .begin()
            .await
            .map_err(|e| WalletError::storage("begin transfer", e))?;

        match transfer_locked(unit.as_mut(), from.id, to.id, amount, reference).await {
            Ok(receipt) => {
                self.commit_or_reconcile(unit, receipt.debit.id).await?;
                info!(
                    from_wallet = %receipt.from.id,
                    to_wallet = %receipt.to.id,
                    amount = %amount,
                    debit_tx = %receipt.debit.id,
                    "Transfer committed"
                );
                Ok(receipt)
            }
            Err(err) => Err(abort(unit, err).await),
        }
    }

    /// Returns the user's balance, provisioning an empty wallet on first use.
    ///
    /// # Errors
    ///
    /// `Internal` on storage failure.
    pub async fn get_balance(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> Result<Balance, WalletError> {
        let wallet = self.resolve_or_create(user_id, currency).await?;
        Ok(Balance {
            balance: wallet.balance,
            currency: wallet.currency,
        })
    }

    /// Returns one page of history, newest first.
    ///
    /// With a currency the page covers that wallet only (provisioning it on first
    /// use); without one it covers every wallet the user owns.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for out-of-range page bounds, `Internal` on storage failure.
    pub async fn get_transaction_history(
        &self,
        user_id: UserId,
        currency: Option<&CurrencyCode>,
        page: PageRequest,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        page.validate()
            .map_err(|e| WalletError::InvalidRequest(e.to_string()))?;

        let rows = match currency {
            Some(currency) => {
                let wallet = self.resolve_or_create(user_id, currency).await?;
                self.ledger
                    .list_by_wallet(wallet.id, page.offset(), page.limit())
                    .await
            }
            None => {
                self.ledger
                    .list_by_owner(user_id, page.offset(), page.limit())
                    .await
            }
        };
        rows.map_err(|e| WalletError::storage("list transactions", e))
    }

    /// Finds the user's wallet or creates an empty one.
    ///
    /// Losing a creation race surfaces as `Duplicate` from the store; the winner's
    /// wallet is then read back.
    async fn resolve_or_create(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> Result<Wallet, WalletError> {
        match self.wallets.find_by_owner(user_id, currency).await {
            Ok(wallet) => return Ok(wallet),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(WalletError::storage("look up wallet", e)),
        }

        match self.wallets.create(Wallet::open(user_id, currency.clone())).await {
            Ok(wallet) => {
                info!(
                    wallet_id = %wallet.id,
                    user_id = %user_id,
                    currency = %currency,
                    "Wallet provisioned"
                );
                Ok(wallet)
            }
            Err(StoreError::Duplicate(_)) => {
                debug!(user_id = %user_id, currency = %currency, "Wallet created concurrently, re-reading");
                self.wallets
                    .find_by_owner(user_id, currency)
                    .await
                    .map_err(|e| WalletError::Internal(format!("re-read wallet: {e}")))
            }
            Err(e) => Err(WalletError::storage("create wallet", e)),
        }
    }

    /// Applies a signed `delta` under optimistic concurrency.
    async fn apply_with_retry(
        &self,
        mut wallet: Wallet,
        delta: Decimal,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<Wallet, WalletError> {
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.retry.backoff(attempt - 1);
                debug!(
                    wallet_id = %wallet.id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Stale wallet version, retrying"
                );
                tokio::time::sleep(delay).await;
                wallet = self
                    .wallets
                    .find_by_id(wallet.id)
                    .await
                    .map_err(|e| WalletError::storage("reload wallet", e))?;
            }

            let entry = WalletTransaction::record(&wallet, delta, kind, reference)
                .ok_or_else(|| over_ceiling(&wallet))?;
            if entry.balance_after < Decimal::ZERO {
                return Err(WalletError::InsufficientFund {
                    wallet_id: wallet.id,
                    balance: wallet.balance,
                    requested: -delta,
                });
            }

            if let Some(updated) = self.try_apply(&wallet, &entry).await? {
                info!(
                    wallet_id = %updated.id,
                    transaction_id = %entry.id,
                    kind = kind.as_str(),
                    amount = %delta,
                    attempt,
                    "Balance updated"
                );
                return Ok(updated);
            }
        }

        warn!(wallet_id = %wallet.id, attempts = max_attempts, "Balance update conflicted");
        Err(WalletError::Conflict {
            attempts: max_attempts,
        })
    }

    /// One compare-and-swap attempt. `None` means the version was stale.
    async fn try_apply(
        &self,
        wallet: &Wallet,
        entry: &WalletTransaction,
    ) -> Result<Option<Wallet>, WalletError> {
        let mut unit = self
            .units
            .begin()
            .await
            .map_err(|e| WalletError::storage("begin balance update", e))?;

        let rows = match unit
            .conditional_update_balance(wallet.id, entry.balance_after, wallet.version)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Err(abort(unit, WalletError::storage("update balance", e)).await),
        };

        if rows == 0 {
            abort(unit, ()).await;
            return Ok(None);
        }

        if let Err(e) = unit.append_transaction(entry).await {
            return Err(abort(unit, WalletError::storage("append transaction", e)).await);
        }

        self.commit_or_reconcile(unit, entry.id).await?;
        Ok(Some(wallet.advanced(entry.balance_after, entry.created_at)))
    }

    /// Commits the unit. On a commit error, decides the outcome by looking up the
    /// ledger entry `written` inside it.
    async fn commit_or_reconcile(
        &self,
        unit: Box<dyn UnitOfWork>,
        written: TransactionId,
    ) -> Result<(), WalletError> {
        let Err(commit_err) = unit.commit().await else {
            return Ok(());
        };

        warn!(transaction_id = %written, error = %commit_err, "Commit failed, reconciling");
        match self.ledger.find_by_id(written).await {
            Ok(Some(_)) => {
                info!(transaction_id = %written, "Commit was durable despite error");
                Ok(())
            }
            Ok(None) => Err(WalletError::Internal(format!(
                "commit failed, no changes applied: {commit_err}"
            ))),
            Err(lookup_err) => {
                error!(
                    transaction_id = %written,
                    commit_error = %commit_err,
                    lookup_error = %lookup_err,
                    "Commit outcome unknown"
                );
                Err(WalletError::Internal(format!(
                    "commit outcome unknown for transaction {written}: {commit_err}"
                )))
            }
        }
    }
}

/// Locks both wallets, writes both balances and both ledger legs.
///
/// Runs entirely inside `unit`; the caller commits or rolls back.
async fn transfer_locked(
    unit: &mut dyn UnitOfWork,
    from_id: WalletId,
    to_id: WalletId,
    amount: Decimal,
    reference: &str,
) -> Result<TransferReceipt, WalletError> {
    // Ascending ID order, so opposite-direction transfers cannot deadlock.
    let (first, second) = if from_id < to_id {
        (from_id, to_id)
    } else {
        (to_id, from_id)
    };
    let first = lock(unit, first).await?;
    let second = lock(unit, second).await?;
    let (from, to) = if first.id == from_id {
        (first, second)
    } else {
        (second, first)
    };

    if from.currency != to.currency {
        return Err(WalletError::InvalidRequest(format!(
            "currency mismatch: {} and {}",
            from.currency, to.currency
        )));
    }
    if from.balance < amount {
        return Err(WalletError::InsufficientFund {
            wallet_id: from.id,
            balance: from.balance,
            requested: amount,
        });
    }

    let debit = WalletTransaction::record(&from, -amount, TransactionKind::Transfer, reference)
        .ok_or_else(|| over_ceiling(&from))?;
    let credit = WalletTransaction::record(&to, amount, TransactionKind::Transfer, reference)
        .ok_or_else(|| over_ceiling(&to))?
        .linked_to(debit.id);

    write_locked(unit, &from, debit.balance_after).await?;
    write_locked(unit, &to, credit.balance_after).await?;

    unit.append_transaction(&debit)
        .await
        .map_err(|e| WalletError::storage("append debit", e))?;
    unit.append_transaction(&credit)
        .await
        .map_err(|e| WalletError::storage("append credit", e))?;

    let at = Utc::now();
    Ok(TransferReceipt {
        from: from.advanced(debit.balance_after, at),
        to: to.advanced(credit.balance_after, at),
        debit,
        credit,
    })
}

async fn lock(unit: &mut dyn UnitOfWork, id: WalletId) -> Result<Wallet, WalletError> {
    unit.lock_wallet(id)
        .await
        .map_err(|e| WalletError::storage("lock wallet", e))
}

/// Updates a wallet we hold the lock on. The version cannot have moved.
async fn write_locked(
    unit: &mut dyn UnitOfWork,
    wallet: &Wallet,
    new_balance: Decimal,
) -> Result<(), WalletError> {
    let rows = unit
        .conditional_update_balance(wallet.id, new_balance, wallet.version)
        .await
        .map_err(|e| WalletError::storage("update balance", e))?;
    if rows == 1 {
        Ok(())
    } else {
        Err(WalletError::Internal(format!(
            "wallet {} changed while locked",
            wallet.id
        )))
    }
}

/// Rolls the unit back and hands `err` through.
async fn abort<E>(unit: Box<dyn UnitOfWork>, err: E) -> E {
    if let Err(rollback_err) = unit.rollback().await {
        warn!(error = %rollback_err, "Rollback failed");
    }
    err
}

fn validate_amount(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidRequest(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(WalletError::InvalidRequest(format!(
            "amount has more than {MAX_AMOUNT_SCALE} decimal places"
        )));
    }
    if amount > MAX_BALANCE {
        return Err(WalletError::InvalidRequest(format!(
            "amount must not exceed {MAX_BALANCE}"
        )));
    }
    Ok(())
}

fn over_ceiling(wallet: &Wallet) -> WalletError {
    WalletError::InvalidRequest(format!(
        "balance of wallet {} would exceed {MAX_BALANCE}",
        wallet.id
    ))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
