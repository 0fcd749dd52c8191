//! Payout, withdrawal and batch job models.
//!
//! A `PayoutRequest` moves an approved statement's net amount to the
//! seller's bank. A `Withdrawal` is the ad-hoc, seller-initiated analogue
//! sharing the same status vocabulary. At-most-once processing rests on
//! conditional status transitions in the store, never on in-process locks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    BatchJobId, EscrowAccountId, Iban, OrgId, PayoutId, SellerId, StatementId, WithdrawalId,
};

/// Payout / withdrawal lifecycle.
///
/// `processing` is the claim state: a worker that wins the conditional
/// `pending -> processing` update owns the record; every other worker
/// observes "already processing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Completed | Self::Failed | Self::Pending)
        )
    }

    /// True once no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Pending or processing — counts against the one-active-payout rule.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the money leaves the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    /// Through the bank-transfer provider.
    BankTransfer,
    /// Manual completion path used when the provider is disabled or failed.
    ManualTransfer,
}

/// Beneficiary bank details. The IBAN is validated at construction and
/// renders redacted everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub holder_name: String,
    pub iban: Iban,
    pub bank_name: Option<String>,
}

/// A statement payout awaiting or undergoing transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub org_id: OrgId,
    pub seller_id: SellerId,
    pub statement_id: StatementId,
    pub escrow_account_id: Option<EscrowAccountId>,
    pub amount: Decimal,
    pub currency: String,
    pub bank_account: BankAccount,
    pub method: PayoutMethod,
    pub status: PayoutStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Earliest next attempt; set by the exponential backoff schedule.
    /// Batch runs respect it, a manual retry may override it.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Provider transaction reference recorded on success.
    pub transaction_reference: Option<String>,
    /// Batch run that claimed this payout, if any.
    pub batch_job_id: Option<BatchJobId>,
    pub requested_at: DateTime<Utc>,
}

impl PayoutRequest {
    /// Whether the retry budget is exhausted.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Seller-initiated ad-hoc payout, balance-checked against the latest
/// approved statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub org_id: OrgId,
    pub seller_id: SellerId,
    /// Statement whose net amount backs this withdrawal.
    pub statement_id: StatementId,
    pub amount: Decimal,
    pub currency: String,
    pub bank_account: BankAccount,
    pub method: PayoutMethod,
    pub status: PayoutStatus,
    pub transaction_reference: Option<String>,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Status of a scheduled batch payout run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Running,
    Completed,
}

/// Groups one scheduling cycle's payout runs with aggregate counts.
/// Terminal once every claimed member resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayoutJob {
    pub id: BatchJobId,
    pub org_id: OrgId,
    pub scheduled_for: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Members lost to a concurrent manual `process_payout` between claim
    /// and processing. Not failures: the other worker owns the outcome.
    pub skipped: usize,
    pub status: BatchJobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_transition_is_exclusive() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Processing));
        assert!(!PayoutStatus::Processing.can_transition_to(PayoutStatus::Processing));
        assert!(!PayoutStatus::Completed.can_transition_to(PayoutStatus::Processing));
    }

    #[test]
    fn cancel_only_while_pending() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Cancelled));
        assert!(!PayoutStatus::Processing.can_transition_to(PayoutStatus::Cancelled));
        assert!(!PayoutStatus::Failed.can_transition_to(PayoutStatus::Cancelled));
    }

    #[test]
    fn retry_resets_to_pending() {
        assert!(PayoutStatus::Processing.can_transition_to(PayoutStatus::Pending));
        assert!(!PayoutStatus::Pending.can_transition_to(PayoutStatus::Pending));
    }

    #[test]
    fn active_statuses() {
        assert!(PayoutStatus::Pending.is_active());
        assert!(PayoutStatus::Processing.is_active());
        assert!(!PayoutStatus::Completed.is_active());
        assert!(!PayoutStatus::Cancelled.is_active());
    }

    #[test]
    fn terminal_statuses() {
        assert!(PayoutStatus::Completed.is_terminal());
        assert!(PayoutStatus::Failed.is_terminal());
        assert!(PayoutStatus::Cancelled.is_terminal());
        assert!(!PayoutStatus::Processing.is_terminal());
    }

    #[test]
    fn retries_exhausted_at_max() {
        let mut payout = PayoutRequest {
            id: PayoutId::new(),
            org_id: OrgId::new(),
            seller_id: SellerId::new(),
            statement_id: StatementId::new(),
            escrow_account_id: None,
            amount: Decimal::new(69720, 2),
            currency: "SAR".into(),
            bank_account: BankAccount {
                holder_name: "Test Seller".into(),
                iban: Iban::parse("SA0380000000608010167519").unwrap(),
                bank_name: None,
            },
            method: PayoutMethod::BankTransfer,
            status: PayoutStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            next_attempt_at: None,
            transaction_reference: None,
            batch_job_id: None,
            requested_at: Utc::now(),
        };
        assert!(!payout.retries_exhausted());
        payout.retry_count = 3;
        assert!(payout.retries_exhausted());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&PayoutStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&PayoutMethod::ManualTransfer).unwrap(),
            "\"manual_transfer\""
        );
    }
}
