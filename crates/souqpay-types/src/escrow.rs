//! # Escrow account model
//!
//! An escrow account holds funds collected for one order or booking until
//! they are released to the seller or refunded to the buyer.
//!
//! ## State Machine
//!
//! ```text
//!   CREATED ──▶ FUNDED ──▶ RELEASE_REQUESTED ──▶ RELEASED
//!                  │                │
//!                  │                └──────────▶ REFUNDED
//!                  └───────────────────────────▶ RELEASED / REFUNDED
//!
//!   any non-terminal ──▶ FAILED
//! ```
//!
//! ## Conservation Invariant
//!
//! At all times: `funded_amount == released_amount + refunded_amount + hold_amount`.
//! Every mutation re-checks this; a violation is rejected before any state
//! is persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BuyerId, EscrowAccountId, EscrowTxId, IdempotencyKey, OrgId, ReleaseId, SellerId};

/// The lifecycle state of an escrow account.
///
/// RELEASED, REFUNDED and FAILED are terminal — no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowState {
    /// Account exists, no funds recorded yet.
    Created,
    /// Funds recorded and held.
    Funded,
    /// A release request exists; funds still held.
    ReleaseRequested,
    /// Held funds released to the seller. Terminal.
    Released,
    /// Held funds refunded to the buyer. Terminal.
    Refunded,
    /// Provider-side funding failed irrecoverably. Terminal.
    Failed,
}

impl EscrowState {
    /// Can this account transition to the given target state?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Funded)
                | (
                    Self::Funded,
                    Self::ReleaseRequested | Self::Released | Self::Refunded
                )
                | (Self::ReleaseRequested, Self::Released | Self::Refunded)
        ) || (!self.is_terminal() && target == Self::Failed)
    }

    /// True for RELEASED, REFUNDED and FAILED.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Failed)
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Funded => write!(f, "FUNDED"),
            Self::ReleaseRequested => write!(f, "RELEASE_REQUESTED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// What kind of source an escrow account was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowSource {
    Order,
    Booking,
}

impl std::fmt::Display for EscrowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "order"),
            Self::Booking => write!(f, "booking"),
        }
    }
}

/// Controls when held funds may be released without `force`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleasePolicy {
    /// Earliest instant at which a non-forced release is permitted.
    pub auto_release_at: Option<DateTime<Utc>>,
    /// Funds frozen pending a risk review; only `force` overrides.
    pub risk_hold: bool,
    /// Release requires a manual compliance review.
    pub requires_review: bool,
}

/// One entry in the append-only audit trail. This is the durable record
/// used for compliance review and must never be pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Holding record for funds collected for one order/booking.
///
/// Owned exclusively by the `EscrowLedger`; mutated only through its
/// state-transition methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub id: EscrowAccountId,
    pub org_id: OrgId,
    pub source: EscrowSource,
    /// Identifier of the order/booking this account escrows, as a string so
    /// bookings and orders share one key space.
    pub source_id: String,
    pub buyer_id: Option<BuyerId>,
    pub seller_id: Option<SellerId>,
    pub currency: String,
    pub expected_amount: Decimal,
    pub funded_amount: Decimal,
    pub released_amount: Decimal,
    pub refunded_amount: Decimal,
    pub hold_amount: Decimal,
    pub state: EscrowState,
    pub release_policy: ReleasePolicy,
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
}

impl EscrowAccount {
    /// Conservation check: `funded == released + refunded + hold`.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.funded_amount == self.released_amount + self.refunded_amount + self.hold_amount
    }

    /// Append an audit entry. The trail is append-only.
    pub fn audit(&mut self, actor: &str, action: &str, reason: Option<String>) {
        self.audit_trail.push(AuditEntry {
            actor: actor.to_string(),
            action: action.to_string(),
            at: Utc::now(),
            reason,
        });
    }
}

/// The type of an immutable escrow transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowTxType {
    Fund,
    Release,
    Refund,
}

impl std::fmt::Display for EscrowTxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fund => write!(f, "FUND"),
            Self::Release => write!(f, "RELEASE"),
            Self::Refund => write!(f, "REFUND"),
        }
    }
}

/// Immutable record of money movement against an escrow account.
/// Append-only; never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: EscrowTxId,
    pub account_id: EscrowAccountId,
    pub org_id: OrgId,
    pub tx_type: EscrowTxType,
    pub amount: Decimal,
    pub currency: String,
    /// Provider that moved the money, when one was involved.
    pub provider: Option<String>,
    pub idempotency_key: IdempotencyKey,
    pub executed_at: DateTime<Utc>,
}

/// Status of an escrow release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Requested,
    Released,
}

/// A release *request*, distinct from the RELEASE transaction it may
/// eventually produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRelease {
    pub id: ReleaseId,
    pub account_id: EscrowAccountId,
    pub org_id: OrgId,
    pub amount: Decimal,
    pub status: ReleaseStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub risk_flags: Vec<String>,
    pub requested_at: DateTime<Utc>,
}
