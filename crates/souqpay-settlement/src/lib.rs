//! # souqpay-settlement
//!
//! Fee computation and statement generation: the pure [`FeeCalculator`]
//! turns one order's value split into a commission/gateway/VAT/reserve
//! breakdown, and the [`SettlementStatementBuilder`] aggregates a seller's
//! eligible orders for a period into a draft statement of signed ledger
//! entries, then walks it through review.

pub mod builder;
pub mod fees;

pub use builder::SettlementStatementBuilder;
pub use fees::{FeeBreakdown, FeeCalculator};
