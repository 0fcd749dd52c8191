//! Payout processing.
//!
//! A payout moves an approved statement's net amount to the seller's bank.
//! At-most-once execution rests on the store's conditional transitions:
//! `process_payout` first wins the `pending -> processing` claim, then
//! talks to the provider; losers observe "already processing" and stop.
//! Provider failures are retried on an exponential backoff schedule;
//! exhausting the budget fails the payout terminally and restores the
//! amount to the seller's available balance — a terminal failure must
//! never leave funds stuck.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use souqpay_escrow::EscrowLedger;
use souqpay_store::{EventOutbox, MemoryStore, NotificationSink};
use souqpay_types::{
    BankAccount, BatchJobId, BatchJobStatus, BatchPayoutJob, EscrowAccountId, IdempotencyKey,
    OrgId, PayoutId, PayoutMethod, PayoutRequest, PayoutStatus, ProviderConfig, Result, SellerId,
    SettlementConfig, SettlementEvent, SouqpayError, StatementId, StatementStatus,
};

use crate::provider::{BankTransferProvider, check_readiness};

/// Result of one processing attempt.
#[derive(Debug)]
pub enum PayoutOutcome {
    /// Transfer succeeded; statement is paid.
    Completed { reference: String },
    /// Provider failed; another attempt is scheduled.
    RetryScheduled {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Retry budget exhausted; amount restored to the seller's balance.
    Failed { reason: String },
}

/// Claims pending payouts and drives them to a terminal state.
pub struct PayoutProcessor {
    store: Arc<MemoryStore>,
    outbox: Arc<EventOutbox>,
    escrow: Arc<EscrowLedger>,
    provider: Arc<dyn BankTransferProvider>,
    notifier: Arc<dyn NotificationSink>,
    config: SettlementConfig,
    provider_config: ProviderConfig,
}

impl PayoutProcessor {
    #[must_use]
    pub fn new(
        store: Arc<MemoryStore>,
        outbox: Arc<EventOutbox>,
        escrow: Arc<EscrowLedger>,
        provider: Arc<dyn BankTransferProvider>,
        notifier: Arc<dyn NotificationSink>,
        config: SettlementConfig,
        provider_config: ProviderConfig,
    ) -> Self {
        Self {
            store,
            outbox,
            escrow,
            provider,
            notifier,
            config,
            provider_config,
        }
    }

    /// Create a pending payout for an approved statement.
    ///
    /// # Errors
    /// - `StatementInvalidState` unless the statement is approved
    /// - `HoldPeriodActive` before the post-period hold elapses
    /// - `BelowMinimumPayout` under the minimum threshold
    /// - `DuplicateActivePayout` when an active payout already exists
    pub fn request_payout(
        &self,
        org_id: OrgId,
        seller_id: SellerId,
        statement_id: StatementId,
        bank_account: BankAccount,
        escrow_account_id: Option<EscrowAccountId>,
    ) -> Result<PayoutId> {
        if bank_account.holder_name.trim().is_empty() {
            return Err(SouqpayError::InvalidBankDetails {
                reason: "holder name is empty".into(),
            });
        }

        let statement = self.store.get_statement(org_id, statement_id)?;
        if statement.seller_id != seller_id {
            return Err(SouqpayError::StatementNotFound(statement_id));
        }
        if statement.status != StatementStatus::Approved {
            return Err(SouqpayError::StatementInvalidState {
                expected: StatementStatus::Approved,
                actual: statement.status,
            });
        }

        let until = statement.period.end + Duration::days(self.config.settlement_hold_days);
        if Utc::now() < until {
            return Err(SouqpayError::HoldPeriodActive { until });
        }

        let amount = statement.summary.net_payout;
        if amount <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }
        if amount < self.config.min_payout {
            return Err(SouqpayError::BelowMinimumPayout {
                amount,
                minimum: self.config.min_payout,
            });
        }

        let payout = PayoutRequest {
            id: PayoutId::new(),
            org_id,
            seller_id,
            statement_id,
            escrow_account_id,
            amount,
            currency: "SAR".into(),
            bank_account,
            method: PayoutMethod::BankTransfer,
            status: PayoutStatus::Pending,
            retry_count: 0,
            max_retries: self.config.max_retries,
            next_attempt_at: None,
            transaction_reference: None,
            batch_job_id: None,
            requested_at: Utc::now(),
        };
        let id = payout.id;
        self.store.insert_payout_unique_active(payout)?;
        tracing::info!(payout = %id, statement = %statement_id, %amount, "payout requested");
        Ok(id)
    }

    /// Process one payout attempt end to end.
    ///
    /// # Errors
    /// - `AlreadyProcessing` when the claim is lost — the payout is owned
    ///   by another worker or already terminal
    /// - configuration errors from the readiness check; the claim is
    ///   reverted and no retry budget is consumed
    pub fn process_payout(&self, org_id: OrgId, payout_id: PayoutId) -> Result<PayoutOutcome> {
        if !self.store.try_claim_payout(org_id, payout_id)? {
            return Err(SouqpayError::AlreadyProcessing(payout_id));
        }
        let payout = self.store.get_payout(org_id, payout_id)?;

        if let Err(err) = check_readiness(&self.provider_config) {
            // Misconfiguration consumes no retry budget: release the claim
            // so the payout runs once an operator fixes the config.
            self.store.with_payout_mut(org_id, payout_id, |p| {
                p.status = PayoutStatus::Pending;
                p.batch_job_id = None;
                Ok(())
            })?;
            tracing::error!(payout = %payout_id, %err, "provider not ready, claim released");
            return Err(err);
        }

        let reference = format!("PAYOUT-{}", payout.id.0.simple());
        match self.provider.transfer(
            payout.amount,
            &payout.currency,
            &payout.bank_account,
            &reference,
        ) {
            Ok(receipt) => self.complete(&payout, receipt.transaction_id),
            Err(err) => self.handle_transfer_failure(&payout, &err),
        }
    }

    /// Claim every due pending payout, process the claimed set, and record
    /// aggregate counts. A second concurrent run claims nothing.
    pub fn process_batch_payouts(
        &self,
        org_id: OrgId,
        scheduled_for: DateTime<Utc>,
    ) -> Result<BatchPayoutJob> {
        let job_id = BatchJobId::new();
        self.store.insert_batch_job(BatchPayoutJob {
            id: job_id,
            org_id,
            scheduled_for,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            status: BatchJobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        });

        let claimed = self.store.claim_due_payouts(org_id, Utc::now(), job_id);
        tracing::info!(batch = %job_id, claimed = claimed.len(), "batch payout run started");

        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for payout_id in &claimed {
            match self.process_payout(org_id, *payout_id) {
                Ok(PayoutOutcome::Completed { .. }) => succeeded += 1,
                Ok(PayoutOutcome::RetryScheduled { .. } | PayoutOutcome::Failed { .. }) => {
                    failed += 1;
                }
                // A manual worker won the claim after ours; the outcome is
                // theirs, not a batch failure.
                Err(SouqpayError::AlreadyProcessing(_)) => {
                    skipped += 1;
                    tracing::debug!(payout = %payout_id, "batch member taken by another worker");
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(payout = %payout_id, %err, "batch member not processed");
                }
            }
        }

        self.store.with_batch_job_mut(org_id, job_id, |job| {
            job.total = claimed.len();
            job.succeeded = succeeded;
            job.failed = failed;
            job.skipped = skipped;
            job.status = BatchJobStatus::Completed;
            job.finished_at = Some(Utc::now());
            Ok(())
        })?;
        let job = self.store.get_batch_job(org_id, job_id)?;
        tracing::info!(batch = %job_id, succeeded, failed, skipped, "batch payout run finished");
        Ok(job)
    }

    /// Cooperative cancellation: permitted only while still pending. Once
    /// claimed, the caller must await the outcome.
    pub fn cancel_payout(&self, org_id: OrgId, payout_id: PayoutId, reason: &str) -> Result<()> {
        self.store.with_payout_mut(org_id, payout_id, |p| {
            if p.status != PayoutStatus::Pending {
                return Err(SouqpayError::PayoutInvalidState {
                    expected: PayoutStatus::Pending,
                    actual: p.status,
                });
            }
            p.status = PayoutStatus::Cancelled;
            Ok(())
        })?;
        self.outbox.record(SettlementEvent::PayoutCancelled {
            org_id,
            payout_id,
            reason: reason.to_string(),
        });
        tracing::info!(payout = %payout_id, reason, "payout cancelled");
        Ok(())
    }

    fn complete(&self, payout: &PayoutRequest, transaction_id: String) -> Result<PayoutOutcome> {
        self.store.with_payout_mut(payout.org_id, payout.id, |p| {
            p.status = PayoutStatus::Completed;
            p.transaction_reference = Some(transaction_id.clone());
            Ok(())
        })?;
        self.store.cas_statement_status(
            payout.org_id,
            payout.statement_id,
            StatementStatus::Approved,
            StatementStatus::Paid,
        )?;

        if let Some(account_id) = payout.escrow_account_id {
            self.release_escrow(payout, account_id);
        }

        self.outbox.record(SettlementEvent::PayoutCompleted {
            org_id: payout.org_id,
            payout_id: payout.id,
            seller_id: payout.seller_id,
            transaction_reference: transaction_id.clone(),
        });
        self.notify(
            payout.seller_id,
            "payout_completed",
            serde_json::json!({
                "payout_id": payout.id.to_string(),
                "amount": payout.amount,
                "reference": transaction_id,
            }),
        );
        tracing::info!(payout = %payout.id, reference = transaction_id, "payout completed");
        Ok(PayoutOutcome::Completed {
            reference: transaction_id,
        })
    }

    fn handle_transfer_failure(
        &self,
        payout: &PayoutRequest,
        err: &SouqpayError,
    ) -> Result<PayoutOutcome> {
        let retry_count = payout.retry_count + 1;
        if retry_count < payout.max_retries {
            let next_attempt_at = Utc::now() + self.config.retry_delay(retry_count);
            self.store.with_payout_mut(payout.org_id, payout.id, |p| {
                p.status = PayoutStatus::Pending;
                p.retry_count = retry_count;
                p.next_attempt_at = Some(next_attempt_at);
                // A retried payout must be claimable by a later batch run.
                p.batch_job_id = None;
                Ok(())
            })?;
            tracing::warn!(
                payout = %payout.id,
                retry_count,
                next_attempt = %next_attempt_at,
                %err,
                "transfer failed, retry scheduled"
            );
            return Ok(PayoutOutcome::RetryScheduled {
                retry_count,
                next_attempt_at,
            });
        }

        let reason = err.to_string();
        self.store.with_payout_mut(payout.org_id, payout.id, |p| {
            p.status = PayoutStatus::Failed;
            p.retry_count = retry_count;
            Ok(())
        })?;
        self.store.cas_statement_status(
            payout.org_id,
            payout.statement_id,
            StatementStatus::Approved,
            StatementStatus::Failed,
        )?;
        // Fund restitution: a terminal failure must not leave funds stuck.
        self.store
            .credit_seller(payout.org_id, payout.seller_id, payout.amount);

        self.outbox.record(SettlementEvent::PayoutFailed {
            org_id: payout.org_id,
            payout_id: payout.id,
            seller_id: payout.seller_id,
            reason: reason.clone(),
        });
        self.notify(
            payout.seller_id,
            "payout_failed",
            serde_json::json!({
                "payout_id": payout.id.to_string(),
                "amount": payout.amount,
                "reason": reason,
            }),
        );
        tracing::error!(payout = %payout.id, reason, "payout failed terminally, balance restored");
        Ok(PayoutOutcome::Failed { reason })
    }

    /// The money already moved; an escrow bookkeeping failure is logged
    /// for reconciliation, never propagated to the caller.
    fn release_escrow(&self, payout: &PayoutRequest, account_id: EscrowAccountId) {
        let result = self
            .escrow
            .get_account(payout.org_id, account_id)
            .and_then(|account| {
                self.escrow.release_funds(
                    payout.org_id,
                    account_id,
                    account.hold_amount,
                    None,
                    IdempotencyKey::new(format!("payout-release:{}", payout.id)),
                    false,
                    "payout_processor",
                )
            });
        if let Err(err) = result {
            tracing::error!(payout = %payout.id, escrow = %account_id, %err, "escrow release needs reconciliation");
        }
    }

    fn notify(&self, seller_id: SellerId, template: &str, data: serde_json::Value) {
        if let Err(err) = self.notifier.notify(seller_id, template, data) {
            tracing::warn!(seller = %seller_id, template, %err, "notification dropped");
        }
    }
}
