//! # souqpay-escrow
//!
//! The escrow subsystem: per-order holding accounts, an append-only
//! transaction log, release requests, and the conservation invariant that
//! binds them (`funded == released + refunded + hold`).
//!
//! All mutation goes through [`EscrowLedger`]. Funding is idempotent by
//! caller-supplied key; release and refund consume the held amount and
//! terminate the account; FAILED is reachable from any non-terminal state.

pub mod ledger;

pub use ledger::{EscrowContext, EscrowLedger};
