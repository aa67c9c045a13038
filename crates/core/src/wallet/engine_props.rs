//! Property-based tests for the balance engine.
//!
//! - Amount validation accepts exactly the positive amounts with at most 8 places
//!   that fit in a wallet balance
//! - Sequential deposits and withdrawals keep the ledger chained to the balance

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;

use purse_shared::types::{CurrencyCode, UserId};

use super::engine::BalanceEngine;
use super::model::MAX_BALANCE;
use super::error::WalletError;
use super::memory::InMemoryStore;
use super::ports::WalletStore;
use super::retry::RetryPolicy;

/// Positive amounts from 0.01 to 10,000.00.
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(Decimal),
    Withdraw(Decimal),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        positive_amount().prop_map(Op::Deposit),
        positive_amount().prop_map(Op::Withdraw),
    ]
}

fn engine(store: &InMemoryStore) -> BalanceEngine {
    BalanceEngine::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        RetryPolicy::fixed(3, Duration::from_millis(1)),
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Non-positive deposits are rejected before any storage call.
    #[test]
    fn prop_non_positive_amount_rejected(cents in -1_000_000i64..=0) {
        let store = InMemoryStore::new();
        let usd = CurrencyCode::parse("USD").unwrap();
        let result = runtime().block_on(
            engine(&store).deposit(UserId::new(), Decimal::new(cents, 2), &usd, "prop"),
        );
        prop_assert!(matches!(result, Err(WalletError::InvalidRequest(_))));
        prop_assert_eq!(store.wallet_count(), 0);
    }

    /// Amounts with more than eight significant decimal places are rejected.
    #[test]
    fn prop_excess_scale_rejected(units in 1i64..1_000_000, scale in 9u32..20) {
        let amount = Decimal::new(units * 10 + 1, scale);
        let store = InMemoryStore::new();
        let usd = CurrencyCode::parse("USD").unwrap();
        let result = runtime().block_on(engine(&store).deposit(UserId::new(), amount, &usd, "prop"));
        prop_assert!(matches!(result, Err(WalletError::InvalidRequest(_))));
    }

    /// Amounts above the balance ceiling are rejected before any storage call,
    /// however large, and never panic.
    #[test]
    fn prop_oversized_amount_rejected(mantissa in any::<i64>(), scale in 0u32..=8) {
        let excess = Decimal::new(mantissa, scale).abs() + Decimal::new(1, 8);
        let amount = MAX_BALANCE.checked_add(excess).unwrap_or(Decimal::MAX);
        let store = InMemoryStore::new();
        let usd = CurrencyCode::parse("USD").unwrap();
        let engine = engine(&store);
        let (a, b) = (UserId::new(), UserId::new());

        let results = runtime().block_on(async {
            [
                engine.deposit(a, amount, &usd, "prop").await.err(),
                engine.withdraw(a, amount, &usd, "prop").await.err(),
                engine.transfer(a, b, amount, &usd, "prop").await.err(),
            ]
        });
        for result in results {
            prop_assert!(matches!(result, Some(WalletError::InvalidRequest(_))));
        }
        prop_assert_eq!(store.wallet_count(), 0);
    }

    /// A deposit that would carry the balance past the ceiling is refused and
    /// leaves the wallet untouched.
    #[test]
    fn prop_deposit_never_passes_ceiling(start_units in 1i64..1_000_000, cents in 1i64..1_000_000) {
        let store = InMemoryStore::new();
        let usd = CurrencyCode::parse("USD").unwrap();
        let user = UserId::new();
        let engine = engine(&store);
        let start = Decimal::new(start_units, 0);
        let amount = MAX_BALANCE - start + Decimal::new(cents, 2);

        let wallet = runtime().block_on(async {
            engine.deposit(user, start, &usd, "prop").await.unwrap();
            let err = engine.deposit(user, amount, &usd, "prop").await.unwrap_err();
            assert!(matches!(err, WalletError::InvalidRequest(_)));
            store.find_by_owner(user, &usd).await.unwrap()
        });
        prop_assert_eq!(wallet.balance, start);
        prop_assert_eq!(store.transaction_count(), 1);
    }

    /// Every committed entry satisfies `after = before + amount`, consecutive entries
    /// chain, and the final balance equals the modelled one.
    #[test]
    fn prop_ledger_chains_to_balance(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let user = UserId::new();
        let usd = CurrencyCode::parse("USD").unwrap();

        let mut expected = Decimal::ZERO;
        runtime().block_on(async {
            for op in &ops {
                match op {
                    Op::Deposit(amount) => {
                        engine.deposit(user, *amount, &usd, "prop").await.unwrap();
                        expected += *amount;
                    }
                    Op::Withdraw(amount) => {
                        match engine.withdraw(user, *amount, &usd, "prop").await {
                            Ok(_) => expected -= *amount,
                            Err(WalletError::InsufficientFund { balance, .. }) => {
                                assert_eq!(balance, expected);
                                assert!(*amount > expected);
                            }
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            }
        });

        let wallet = runtime().block_on(store.find_by_owner(user, &usd)).unwrap();
        prop_assert_eq!(wallet.balance, expected);
        prop_assert!(wallet.balance >= Decimal::ZERO);

        let history = store.transactions_of(wallet.id);
        let mut running = Decimal::ZERO;
        for tx in &history {
            prop_assert_eq!(tx.balance_before, running);
            prop_assert_eq!(tx.balance_after, tx.balance_before + tx.amount);
            running = tx.balance_after;
        }
        prop_assert_eq!(running, wallet.balance);
        prop_assert_eq!(wallet.version, 1 + i64::try_from(history.len()).unwrap());
    }
}
