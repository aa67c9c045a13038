//! Wallet and ledger transaction domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use purse_shared::types::{CurrencyCode, TransactionId, UserId, WalletId};

/// Version assigned to a freshly provisioned wallet.
pub const INITIAL_VERSION: i64 = 1;

/// Largest balance a wallet can hold: `99999999999999999999.99999999`, the top of
/// `NUMERIC(28, 8)`.
pub const MAX_BALANCE: Decimal =
    Decimal::from_parts(268_435_455, 1_042_612_833, 542_101_086, false, 8);

/// A per-(user, currency) balance with an optimistic version counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet ID.
    pub id: WalletId,
    /// Owning user.
    pub user_id: UserId,
    /// Currency of the balance.
    pub currency: CurrencyCode,
    /// Current balance, never negative once committed.
    pub balance: Decimal,
    /// Incremented by every successful balance mutation.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet for the given owner.
    #[must_use]
    pub fn open(user_id: UserId, currency: CurrencyCode) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            user_id,
            currency,
            balance: Decimal::ZERO,
            version: INITIAL_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance after applying the signed `delta`, or `None` when the result would
    /// exceed [`MAX_BALANCE`].
    #[must_use]
    pub fn balance_after(&self, delta: Decimal) -> Option<Decimal> {
        self.balance
            .checked_add(delta)
            .filter(|balance| *balance <= MAX_BALANCE)
    }

    /// Returns the state this wallet has after a successful update to `new_balance`.
    #[must_use]
    pub fn advanced(&self, new_balance: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            balance: new_balance,
            version: self.version + 1,
            updated_at: at,
            ..self.clone()
        }
    }
}

/// Kind of balance change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Funds credited from outside the system.
    Deposit,
    /// Funds debited to outside the system.
    Withdrawal,
    /// One leg of a wallet-to-wallet transfer.
    Transfer,
}

impl TransactionKind {
    /// Returns the stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
        }
    }
}

/// An immutable ledger entry describing one balance change.
///
/// `amount` is signed: positive credits the wallet, negative debits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Transaction ID, assigned by the caller.
    pub id: TransactionId,
    /// Wallet whose balance changed.
    pub wallet_id: WalletId,
    /// Owner of that wallet.
    pub user_id: UserId,
    /// Currency of the wallet.
    pub currency: CurrencyCode,
    /// Signed change.
    pub amount: Decimal,
    /// Balance before the change.
    pub balance_before: Decimal,
    /// Balance after the change, always `balance_before + amount`.
    pub balance_after: Decimal,
    /// Kind of change.
    pub kind: TransactionKind,
    /// For a transfer's credit leg, the ID of its debit leg.
    pub related_tx_id: Option<TransactionId>,
    /// Free-form caller reference.
    pub reference: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Records applying `amount` to the wallet's current balance.
    ///
    /// `None` when the resulting balance would exceed [`MAX_BALANCE`].
    #[must_use]
    pub fn record(
        wallet: &Wallet,
        amount: Decimal,
        kind: TransactionKind,
        reference: &str,
    ) -> Option<Self> {
        let balance_after = wallet.balance_after(amount)?;
        Some(Self {
            id: TransactionId::new(),
            wallet_id: wallet.id,
            user_id: wallet.user_id,
            currency: wallet.currency.clone(),
            amount,
            balance_before: wallet.balance,
            balance_after,
            kind,
            related_tx_id: None,
            reference: reference.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Links this entry back to another one (credit leg to debit leg).
    #[must_use]
    pub fn linked_to(mut self, related: TransactionId) -> Self {
        self.related_tx_id = Some(related);
        self
    }
}

/// The result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Source wallet after the transfer.
    pub from: Wallet,
    /// Destination wallet after the transfer.
    pub to: Wallet,
    /// Debit leg, recorded against the source wallet.
    pub debit: WalletTransaction,
    /// Credit leg, linked back to the debit leg.
    pub credit: WalletTransaction,
}

/// Balance view of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Current balance.
    pub balance: Decimal,
    /// Currency of the balance.
    pub currency: CurrencyCode,
}
