//! Settlement statement model.
//!
//! A statement is a period-bounded, seller-scoped snapshot of fees and net
//! payout derived from eligible orders. The builder creates statements in
//! `draft`; `paid`/`failed` are reachable only through the payout processor.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{OrderId, OrgId, SellerId, StatementId};

/// Statement lifecycle.
///
/// ```text
/// draft -> pending -> approved -> paid
///                              -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Draft,
    Pending,
    Approved,
    Paid,
    Failed,
}

impl StatementStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Pending)
                | (Self::Pending, Self::Approved)
                | (Self::Approved, Self::Paid | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Paid => write!(f, "paid"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Inclusive settlement period `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// One ledger transaction component inside a statement. Amounts are signed:
/// sales positive, fees/refunds/reserves negative, adjustments either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Sale,
    Commission,
    GatewayFee,
    Vat,
    ReserveHold,
    Refund,
    Chargeback,
    Adjustment,
}

impl std::fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sale => "sale",
            Self::Commission => "commission",
            Self::GatewayFee => "gateway_fee",
            Self::Vat => "vat",
            Self::ReserveHold => "reserve_hold",
            Self::Refund => "refund",
            Self::Chargeback => "chargeback",
            Self::Adjustment => "adjustment",
        };
        write!(f, "{name}")
    }
}

/// A single signed ledger transaction within a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub order_id: Option<OrderId>,
    pub kind: LedgerEntryKind,
    pub amount: Decimal,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated totals for a statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementSummary {
    pub gross_sales: Decimal,
    pub commissions: Decimal,
    pub gateway_fees: Decimal,
    pub vat: Decimal,
    pub refunds: Decimal,
    pub reserves: Decimal,
    pub net_payout: Decimal,
}

/// Per seller/period settlement snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementStatement {
    pub id: StatementId,
    pub org_id: OrgId,
    pub seller_id: SellerId,
    pub period: Period,
    pub summary: StatementSummary,
    pub entries: Vec<LedgerEntry>,
    pub status: StatementStatus,
    /// SHA-256 over the ordered ledger entries; recomputed whenever an
    /// entry is appended so tampering with a stored statement is detectable.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl SettlementStatement {
    /// Deterministic checksum over the ordered ledger entries.
    #[must_use]
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"souqpay:statement:v1:");
        hasher.update(self.id.0.as_bytes());
        hasher.update((self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            if let Some(order_id) = entry.order_id {
                hasher.update(order_id.0.as_bytes());
            }
            hasher.update(entry.kind.to_string().as_bytes());
            hasher.update(entry.amount.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Append a ledger entry and refresh the checksum.
    pub fn push_entry(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
        self.checksum = self.compute_checksum();
    }

    /// Verify the stored checksum against the entries.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> SettlementStatement {
        let mut stmt = SettlementStatement {
            id: StatementId::new(),
            org_id: OrgId::new(),
            seller_id: SellerId::new(),
            period: Period::new(
                Utc::now() - chrono::Duration::days(30),
                Utc::now() - chrono::Duration::days(1),
            ),
            summary: StatementSummary::default(),
            entries: Vec::new(),
            status: StatementStatus::Draft,
            checksum: String::new(),
            created_at: Utc::now(),
        };
        stmt.checksum = stmt.compute_checksum();
        stmt
    }

    #[test]
    fn status_transitions() {
        assert!(StatementStatus::Draft.can_transition_to(StatementStatus::Pending));
        assert!(StatementStatus::Pending.can_transition_to(StatementStatus::Approved));
        assert!(StatementStatus::Approved.can_transition_to(StatementStatus::Paid));
        assert!(StatementStatus::Approved.can_transition_to(StatementStatus::Failed));

        assert!(!StatementStatus::Draft.can_transition_to(StatementStatus::Paid));
        assert!(!StatementStatus::Paid.can_transition_to(StatementStatus::Approved));
        assert!(!StatementStatus::Failed.can_transition_to(StatementStatus::Paid));
    }

    #[test]
    fn period_contains_bounds() {
        let p = Period::new(
            Utc::now() - chrono::Duration::days(10),
            Utc::now() - chrono::Duration::days(5),
        );
        assert!(p.contains(Utc::now() - chrono::Duration::days(7)));
        assert!(!p.contains(Utc::now()));
    }

    #[test]
    fn checksum_tracks_entries() {
        let mut stmt = statement();
        let before = stmt.checksum.clone();
        assert!(stmt.checksum_valid());

        stmt.push_entry(LedgerEntry {
            order_id: Some(OrderId::new()),
            kind: LedgerEntryKind::Sale,
            amount: Decimal::new(1000, 0),
            note: None,
            recorded_at: Utc::now(),
        });
        assert_ne!(stmt.checksum, before);
        assert!(stmt.checksum_valid());
    }

    #[test]
    fn tampered_entry_detected() {
        let mut stmt = statement();
        stmt.push_entry(LedgerEntry {
            order_id: None,
            kind: LedgerEntryKind::Adjustment,
            amount: Decimal::new(-50, 0),
            note: Some("goodwill credit reversal".into()),
            recorded_at: Utc::now(),
        });
        assert!(stmt.checksum_valid());
        stmt.entries[0].amount = Decimal::new(-5000, 0);
        assert!(!stmt.checksum_valid());
    }

    #[test]
    fn ledger_kind_wire_names() {
        assert_eq!(LedgerEntryKind::GatewayFee.to_string(), "gateway_fee");
        assert_eq!(LedgerEntryKind::ReserveHold.to_string(), "reserve_hold");
        assert_eq!(
            serde_json::to_string(&LedgerEntryKind::GatewayFee).unwrap(),
            "\"gateway_fee\""
        );
    }

    #[test]
    fn serde_roundtrip() {
        let stmt = statement();
        let json = serde_json::to_string(&stmt).unwrap();
        let back: SettlementStatement = serde_json::from_str(&json).unwrap();
        assert_eq!(stmt.id, back.id);
        assert_eq!(stmt.checksum, back.checksum);
    }
}
