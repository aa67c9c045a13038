//! Shared types, errors, and configuration for Purse.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Validated ISO 4217 currency codes
//! - Pagination parameters for history listings
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, WalletConfig};
pub use error::AppError;
