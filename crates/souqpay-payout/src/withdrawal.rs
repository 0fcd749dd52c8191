//! Ad-hoc withdrawals.
//!
//! A seller may draw against the latest approved statement without waiting
//! for the scheduled payout run. The balance check is
//! `available = net_payout - already withdrawn`; the transfer goes through
//! the same provider path as statement payouts, falling back to a manual
//! completion queue when the provider is disabled or fails. IBANs never
//! appear unredacted in logs.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use souqpay_store::{EventOutbox, MemoryStore, NotificationSink};
use souqpay_types::{
    BankAccount, OrgId, PayoutMethod, PayoutStatus, ProviderConfig, Result, SellerId,
    SettlementEvent, SouqpayError, Withdrawal, WithdrawalId,
};

use crate::provider::{BankTransferProvider, check_readiness};

/// Seller-initiated withdrawals against an approved statement.
pub struct WithdrawalService {
    store: Arc<MemoryStore>,
    outbox: Arc<EventOutbox>,
    provider: Arc<dyn BankTransferProvider>,
    notifier: Arc<dyn NotificationSink>,
    provider_config: ProviderConfig,
}

impl WithdrawalService {
    #[must_use]
    pub fn new(
        store: Arc<MemoryStore>,
        outbox: Arc<EventOutbox>,
        provider: Arc<dyn BankTransferProvider>,
        notifier: Arc<dyn NotificationSink>,
        provider_config: ProviderConfig,
    ) -> Self {
        Self {
            store,
            outbox,
            provider,
            notifier,
            provider_config,
        }
    }

    /// Validate, balance-check, record and attempt an ad-hoc withdrawal.
    ///
    /// # Errors
    /// - `InvalidAmount` / `InvalidBankDetails` on validation failure
    /// - `NoApprovedStatement` when nothing backs the withdrawal
    /// - `InsufficientAvailableBalance` when the amount exceeds what is left
    pub fn process_withdrawal(
        &self,
        org_id: OrgId,
        seller_id: SellerId,
        amount: Decimal,
        bank_account: BankAccount,
    ) -> Result<Withdrawal> {
        if amount <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }
        if bank_account.holder_name.trim().is_empty() {
            return Err(SouqpayError::InvalidBankDetails {
                reason: "holder name is empty".into(),
            });
        }

        let statement = self
            .store
            .latest_approved_statement(org_id, seller_id)
            .ok_or(SouqpayError::NoApprovedStatement)?;
        let withdrawn = self.store.withdrawn_against(org_id, statement.id);
        let available = statement.summary.net_payout - withdrawn;
        if amount > available {
            return Err(SouqpayError::InsufficientAvailableBalance {
                requested: amount,
                available,
            });
        }

        let withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            org_id,
            seller_id,
            statement_id: statement.id,
            amount,
            currency: "SAR".into(),
            bank_account,
            method: PayoutMethod::BankTransfer,
            status: PayoutStatus::Pending,
            transaction_reference: None,
            note: None,
            requested_at: Utc::now(),
        };
        let id = withdrawal.id;
        self.store.insert_withdrawal(withdrawal.clone());
        self.outbox.record(SettlementEvent::WithdrawalRequested {
            org_id,
            withdrawal_id: id,
            seller_id,
            amount,
        });
        tracing::info!(
            withdrawal = %id,
            seller = %seller_id,
            %amount,
            iban = %withdrawal.bank_account.iban,
            "withdrawal requested"
        );

        if let Err(err) = check_readiness(&self.provider_config) {
            return self.queue_manual(withdrawal, &err);
        }
        let reference = format!("WD-{}", id.0.simple());
        match self.provider.transfer(
            amount,
            &withdrawal.currency,
            &withdrawal.bank_account,
            &reference,
        ) {
            Ok(receipt) => self.complete(withdrawal, receipt.transaction_id),
            Err(err) => self.queue_manual(withdrawal, &err),
        }
    }

    fn complete(&self, withdrawal: Withdrawal, transaction_id: String) -> Result<Withdrawal> {
        let updated = self
            .store
            .with_withdrawal_mut(withdrawal.org_id, withdrawal.id, |w| {
                w.status = PayoutStatus::Completed;
                w.transaction_reference = Some(transaction_id.clone());
                Ok(w.clone())
            })?;
        self.outbox.record(SettlementEvent::WithdrawalCompleted {
            org_id: withdrawal.org_id,
            withdrawal_id: withdrawal.id,
            seller_id: withdrawal.seller_id,
            transaction_reference: transaction_id.clone(),
        });
        if let Err(err) = self.notifier.notify(
            withdrawal.seller_id,
            "withdrawal_completed",
            serde_json::json!({
                "withdrawal_id": withdrawal.id.to_string(),
                "amount": withdrawal.amount,
                "reference": transaction_id,
            }),
        ) {
            tracing::warn!(seller = %withdrawal.seller_id, %err, "notification dropped");
        }
        tracing::info!(withdrawal = %withdrawal.id, reference = transaction_id, "withdrawal completed");
        Ok(updated)
    }

    /// Manual fallback: the withdrawal stays pending on the manual path,
    /// an operator completes the transfer by hand. The seller is told the
    /// transfer will take longer than usual.
    fn queue_manual(&self, withdrawal: Withdrawal, cause: &SouqpayError) -> Result<Withdrawal> {
        let note = format!("provider unavailable, queued for manual transfer: {cause}");
        let updated = self
            .store
            .with_withdrawal_mut(withdrawal.org_id, withdrawal.id, |w| {
                w.method = PayoutMethod::ManualTransfer;
                w.note = Some(note.clone());
                Ok(w.clone())
            })?;
        if let Err(err) = self.notifier.notify(
            withdrawal.seller_id,
            "withdrawal_manual_queue",
            serde_json::json!({
                "withdrawal_id": withdrawal.id.to_string(),
                "amount": withdrawal.amount,
                "reason": note,
            }),
        ) {
            tracing::warn!(seller = %withdrawal.seller_id, %err, "notification dropped");
        }
        tracing::warn!(withdrawal = %withdrawal.id, %cause, "withdrawal routed to manual transfer");
        Ok(updated)
    }
}
