//! Entity prelude.

pub use super::wallet_transactions::Entity as WalletTransactions;
pub use super::wallets::Entity as Wallets;
