//! Wallet routes: deposit, withdraw, transfer, balance and history.
//!
//! Path and query input is parsed here and rejected with 400 before it reaches the
//! engine. Decimals travel as JSON strings.

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use purse_core::wallet::{Balance, TransferReceipt, Wallet, WalletTransaction};
use purse_shared::types::{CurrencyCode, PageRequest, TransactionId, UserId, WalletId};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_CURRENCY: &str = "USD";

/// Creates the wallet routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/wallet/deposit", post(deposit))
        .route("/users/{user_id}/wallet/withdraw", post(withdraw))
        .route("/users/{user_id}/wallet/transfer", post(transfer))
        .route("/users/{user_id}/wallet/balance", get(balance))
        .route("/users/{user_id}/wallet/transactions", get(transactions))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of a deposit or withdrawal.
#[derive(Debug, Deserialize)]
pub struct MutationRequest {
    /// Positive amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Free-form caller reference.
    #[serde(default)]
    pub reference: String,
}

/// Body of a transfer.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Receiving user.
    pub to_user_id: String,
    /// Positive amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Free-form caller reference.
    #[serde(default)]
    pub reference: String,
}

/// Query of the balance route.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Currency code, `USD` when absent.
    pub currency: Option<String>,
}

/// Query of the history route.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Currency code; absent or empty lists every wallet of the user.
    pub currency: Option<String>,
    /// Page number (1-indexed).
    pub page: Option<u32>,
    /// Items per page.
    pub page_size: Option<u32>,
}

/// A wallet after a mutation.
#[derive(Debug, Serialize)]
pub struct WalletView {
    /// Wallet ID.
    pub id: WalletId,
    /// Owner.
    pub user_id: UserId,
    /// Balance.
    pub balance: Decimal,
    /// Currency.
    pub currency: CurrencyCode,
}

impl From<Wallet> for WalletView {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            balance: wallet.balance,
            currency: wallet.currency,
        }
    }
}

/// Result of a transfer.
#[derive(Debug, Serialize)]
pub struct TransferView {
    /// Source wallet after the transfer.
    pub wallet: WalletView,
    /// Debit leg recorded on the source wallet.
    pub debit_transaction_id: TransactionId,
    /// Credit leg recorded on the destination wallet.
    pub credit_transaction_id: TransactionId,
}

impl From<TransferReceipt> for TransferView {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            wallet: receipt.from.into(),
            debit_transaction_id: receipt.debit.id,
            credit_transaction_id: receipt.credit.id,
        }
    }
}

/// A ledger entry.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    /// Transaction ID.
    pub id: TransactionId,
    /// Signed amount.
    pub amount: Decimal,
    /// Balance before.
    pub balance_before: Decimal,
    /// Balance after.
    pub balance_after: Decimal,
    /// Currency.
    pub currency: CurrencyCode,
    /// `deposit`, `withdrawal` or `transfer`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Caller reference.
    pub reference: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<WalletTransaction> for TransactionView {
    fn from(tx: WalletTransaction) -> Self {
        Self {
            id: tx.id,
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            currency: tx.currency,
            kind: tx.kind.as_str(),
            reference: tx.reference,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// One page of history.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Entries, newest first.
    pub transactions: Vec<TransactionView>,
    /// Page number.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
}

// ============================================================================
// Input parsing
// ============================================================================

fn parse_user(raw: &str) -> Result<UserId, ApiError> {
    UserId::from_str(raw).map_err(|_| ApiError::invalid(format!("invalid user id: {raw}")))
}

fn parse_currency(raw: &str) -> Result<CurrencyCode, ApiError> {
    CurrencyCode::parse(raw).map_err(|e| ApiError::invalid(e.to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid(rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::invalid(rejection.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST `/users/{user_id}/wallet/deposit`
async fn deposit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<MutationRequest>, JsonRejection>,
) -> Result<Json<WalletView>, ApiError> {
    let user_id = parse_user(&user_id)?;
    let request = body(payload)?;
    let currency = parse_currency(&request.currency)?;

    let wallet = state
        .engine
        .deposit(user_id, request.amount, &currency, &request.reference)
        .await?;
    Ok(Json(wallet.into()))
}

/// POST `/users/{user_id}/wallet/withdraw`
async fn withdraw(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<MutationRequest>, JsonRejection>,
) -> Result<Json<WalletView>, ApiError> {
    let user_id = parse_user(&user_id)?;
    let request = body(payload)?;
    let currency = parse_currency(&request.currency)?;

    let wallet = state
        .engine
        .withdraw(user_id, request.amount, &currency, &request.reference)
        .await?;
    Ok(Json(wallet.into()))
}

/// POST `/users/{user_id}/wallet/transfer`
async fn transfer(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferView>, ApiError> {
    let from = parse_user(&user_id)?;
    let request = body(payload)?;
    let to = parse_user(&request.to_user_id)?;
    let currency = parse_currency(&request.currency)?;

    let receipt = state
        .engine
        .transfer(from, to, request.amount, &currency, &request.reference)
        .await?;
    Ok(Json(receipt.into()))
}

/// GET `/users/{user_id}/wallet/balance?currency=`
async fn balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    params: Result<Query<BalanceQuery>, QueryRejection>,
) -> Result<Json<Balance>, ApiError> {
    let user_id = parse_user(&user_id)?;
    let params = query(params)?;
    let currency = parse_currency(params.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;

    Ok(Json(state.engine.get_balance(user_id, &currency).await?))
}

/// GET `/users/{user_id}/wallet/transactions?currency=&page=&page_size=`
async fn transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    params: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = parse_user(&user_id)?;
    let params = query(params)?;
    let currency = match params.currency.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_currency(raw)?),
    };
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        params.page.unwrap_or(defaults.page),
        params.page_size.unwrap_or(defaults.page_size),
    );

    let history = state
        .engine
        .get_transaction_history(user_id, currency.as_ref(), page)
        .await?;

    Ok(Json(HistoryResponse {
        transactions: history.into_iter().map(TransactionView::from).collect(),
        page: page.page,
        page_size: page.page_size,
    }))
}

#[cfg(test)]
#[path = "wallets_tests.rs"]
mod tests;
