//! # souqpay-types
//!
//! Shared types, errors, and configuration for the **SouqPay** marketplace
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrgId`], [`SellerId`], [`BuyerId`], [`OrderId`], [`EscrowAccountId`],
//!   [`StatementId`], [`PayoutId`], [`WithdrawalId`], [`BatchJobId`], [`IdempotencyKey`]
//! - **Escrow model**: [`EscrowAccount`], [`EscrowState`], [`EscrowTransaction`], [`EscrowRelease`]
//! - **Statement model**: [`SettlementStatement`], [`StatementStatus`], [`LedgerEntry`]
//! - **Payout model**: [`PayoutRequest`], [`PayoutStatus`], [`Withdrawal`], [`BatchPayoutJob`]
//! - **Order projection**: [`DeliveredOrder`]
//! - **Bank details**: [`Iban`] (MOD-97 validated, log-redacting), [`BankAccount`]
//! - **Events**: [`SettlementEvent`] — one tagged variant per lifecycle event
//! - **Configuration**: [`SettlementConfig`], [`ProviderConfig`]
//! - **Errors**: [`SouqpayError`] with `SP_ERR_` prefix codes

pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod event;
pub mod iban;
pub mod ids;
pub mod order;
pub mod payout;
pub mod statement;

// Re-export all primary types at crate root for ergonomic imports:
//   use souqpay_types::{EscrowAccount, PayoutRequest, SettlementEvent, ...};

pub use config::*;
pub use error::*;
pub use escrow::*;
pub use event::*;
pub use iban::*;
pub use ids::*;
pub use order::*;
pub use payout::*;
pub use statement::*;

// Constants are accessed via `souqpay_types::constants::FOO`
// (not re-exported to avoid name collisions).
