//! Wallet balance engine.
//!
//! This module implements:
//! - Wallet and ledger transaction types
//! - Storage ports and an in-memory adapter
//! - Optimistic single-wallet updates with bounded, backed-off retries
//! - Locked double-entry transfers with commit reconciliation

pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod ports;
pub mod retry;

#[cfg(test)]
mod engine_props;
#[cfg(test)]
mod retry_props;

pub use engine::{BalanceEngine, MAX_AMOUNT_SCALE};
pub use error::{StoreError, WalletError, WalletErrorKind};
pub use memory::InMemoryStore;
pub use model::{
    Balance, MAX_BALANCE, TransactionKind, TransferReceipt, Wallet, WalletTransaction,
};
pub use ports::{TransactionLedger, UnitOfWork, UnitOfWorkFactory, WalletStore};
pub use retry::RetryPolicy;
