//! `SeaORM` active enums mapped to Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "wallet_transaction_kind"
)]
pub enum WalletTransactionKind {
    #[sea_orm(string_value = "deposit")]
    Deposit,
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

impl From<purse_core::wallet::TransactionKind> for WalletTransactionKind {
    fn from(kind: purse_core::wallet::TransactionKind) -> Self {
        use purse_core::wallet::TransactionKind;
        match kind {
            TransactionKind::Deposit => Self::Deposit,
            TransactionKind::Withdrawal => Self::Withdrawal,
            TransactionKind::Transfer => Self::Transfer,
        }
    }
}

impl From<WalletTransactionKind> for purse_core::wallet::TransactionKind {
    fn from(kind: WalletTransactionKind) -> Self {
        match kind {
            WalletTransactionKind::Deposit => Self::Deposit,
            WalletTransactionKind::Withdrawal => Self::Withdrawal,
            WalletTransactionKind::Transfer => Self::Transfer,
        }
    }
}
