//! Core business logic for Purse.
//!
//! This crate contains the balance engine with ZERO web or database dependencies.
//! Storage is reached only through the ports in [`wallet::ports`].
//!
//! # Modules
//!
//! - `wallet` - Wallets, the transaction ledger model, and the balance engine

pub mod wallet;
