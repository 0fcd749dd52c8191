//! Settlement lifecycle events.
//!
//! One tagged variant per event name, each with a typed payload. Downstream
//! queues receive these through the outbox; consumers deduplicate by the
//! event's idempotency key because delivery is at-least-once. There is no
//! untyped event path — unknown payload shapes are unrepresentable.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    EscrowAccountId, EscrowTxId, OrgId, PayoutId, SellerId, StatementId, WithdrawalId,
};

/// All lifecycle events the settlement core emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    EscrowFunded {
        org_id: OrgId,
        account_id: EscrowAccountId,
        /// Funding is repeatable, so each funding transaction gets its
        /// own event; the transaction id keys the deduplication.
        tx_id: EscrowTxId,
        amount: Decimal,
    },
    EscrowReleased {
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
    },
    EscrowRefunded {
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
    },
    EscrowFailed {
        org_id: OrgId,
        account_id: EscrowAccountId,
        reason: String,
    },
    StatementGenerated {
        org_id: OrgId,
        statement_id: StatementId,
        seller_id: SellerId,
        net_payout: Decimal,
    },
    PayoutCompleted {
        org_id: OrgId,
        payout_id: PayoutId,
        seller_id: SellerId,
        transaction_reference: String,
    },
    PayoutFailed {
        org_id: OrgId,
        payout_id: PayoutId,
        seller_id: SellerId,
        reason: String,
    },
    PayoutCancelled {
        org_id: OrgId,
        payout_id: PayoutId,
        reason: String,
    },
    WithdrawalRequested {
        org_id: OrgId,
        withdrawal_id: WithdrawalId,
        seller_id: SellerId,
        amount: Decimal,
    },
    WithdrawalCompleted {
        org_id: OrgId,
        withdrawal_id: WithdrawalId,
        seller_id: SellerId,
        transaction_reference: String,
    },
}

impl SettlementEvent {
    /// Queue topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::EscrowFunded { .. }
            | Self::EscrowReleased { .. }
            | Self::EscrowRefunded { .. }
            | Self::EscrowFailed { .. } => "settlement.escrow",
            Self::StatementGenerated { .. } => "settlement.statements",
            Self::PayoutCompleted { .. } | Self::PayoutFailed { .. } | Self::PayoutCancelled { .. } => {
                "settlement.payouts"
            }
            Self::WithdrawalRequested { .. } | Self::WithdrawalCompleted { .. } => {
                "settlement.withdrawals"
            }
        }
    }

    /// Deduplication key: stable for the same logical event, distinct
    /// across different transitions of the same entity.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        match self {
            Self::EscrowFunded { account_id, tx_id, .. } => {
                format!("escrow.funded:{account_id}:{tx_id}")
            }
            Self::EscrowReleased { account_id, .. } => format!("escrow.released:{account_id}"),
            Self::EscrowRefunded { account_id, .. } => format!("escrow.refunded:{account_id}"),
            Self::EscrowFailed { account_id, .. } => format!("escrow.failed:{account_id}"),
            Self::StatementGenerated { statement_id, .. } => {
                format!("statement.generated:{statement_id}")
            }
            Self::PayoutCompleted { payout_id, .. } => format!("payout.completed:{payout_id}"),
            Self::PayoutFailed { payout_id, .. } => format!("payout.failed:{payout_id}"),
            Self::PayoutCancelled { payout_id, .. } => format!("payout.cancelled:{payout_id}"),
            Self::WithdrawalRequested { withdrawal_id, .. } => {
                format!("withdrawal.requested:{withdrawal_id}")
            }
            Self::WithdrawalCompleted { withdrawal_id, .. } => {
                format!("withdrawal.completed:{withdrawal_id}")
            }
        }
    }
}
