//! # souqpay-payout
//!
//! The money-out side of settlement: the [`BankTransferProvider`] seam,
//! the [`PayoutProcessor`] (claim, transfer, retry with backoff, batch
//! runs, terminal-failure restitution), and the [`WithdrawalService`] for
//! seller-initiated ad-hoc withdrawals with a manual fallback path.

pub mod processor;
pub mod provider;
pub mod withdrawal;

pub use processor::{PayoutOutcome, PayoutProcessor};
pub use provider::{BankTransferProvider, TransferReceipt, TransferStatus, check_readiness};
pub use withdrawal::WithdrawalService;
