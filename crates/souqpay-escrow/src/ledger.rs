//! Escrow ledger — owns escrow accounts and their transaction history.
//!
//! All money movement against an escrow account goes through this ledger:
//! funding, release requests, releases, refunds, and administrative
//! failure. Every operation is tenant-scoped and idempotent, every
//! mutation appends to the account's audit trail, and the conservation
//! invariant (`funded == released + refunded + hold`) is re-checked before
//! anything is persisted.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use souqpay_store::{EventOutbox, MemoryStore};
use souqpay_types::{
    AuditEntry, BuyerId, EscrowAccount, EscrowAccountId, EscrowRelease, EscrowSource, EscrowState,
    EscrowTransaction, EscrowTxId, EscrowTxType, IdempotencyKey, OrgId, ReleaseId, ReleasePolicy,
    ReleaseStatus, Result, SellerId, SettlementEvent, SouqpayError,
};

/// Everything needed to open an escrow account for one order/booking.
#[derive(Debug, Clone)]
pub struct EscrowContext {
    pub org_id: OrgId,
    pub source: EscrowSource,
    pub source_id: String,
    pub buyer_id: Option<BuyerId>,
    pub seller_id: Option<SellerId>,
    pub currency: String,
    pub expected_amount: Decimal,
    pub release_policy: ReleasePolicy,
}

/// Owns per-source escrow accounts and their transaction/state history.
pub struct EscrowLedger {
    store: Arc<MemoryStore>,
    outbox: Arc<EventOutbox>,
}

impl EscrowLedger {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, outbox: Arc<EventOutbox>) -> Self {
        Self { store, outbox }
    }

    /// Open an escrow account, or return the existing one for the same
    /// `(org, source, source_id)` — creation is a natural-key no-op replay.
    pub fn create_account(&self, ctx: EscrowContext) -> EscrowAccountId {
        let account = EscrowAccount {
            id: EscrowAccountId::new(),
            org_id: ctx.org_id,
            source: ctx.source,
            source_id: ctx.source_id,
            buyer_id: ctx.buyer_id,
            seller_id: ctx.seller_id,
            currency: ctx.currency,
            expected_amount: ctx.expected_amount,
            funded_amount: Decimal::ZERO,
            released_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            hold_amount: Decimal::ZERO,
            state: EscrowState::Created,
            release_policy: ctx.release_policy,
            audit_trail: vec![AuditEntry {
                actor: "system".into(),
                action: "create".into(),
                at: Utc::now(),
                reason: None,
            }],
            created_at: Utc::now(),
        };
        let id = self.store.find_or_insert_account(account);
        tracing::debug!(account = %id, "escrow account ready");
        id
    }

    /// Record incoming funds. Replay-safe: a second call with the same
    /// idempotency key is rejected and changes nothing.
    ///
    /// # Errors
    /// - `DuplicateFunding` on idempotency-key replay
    /// - `InvalidAmount` for non-positive amounts
    /// - `EscrowInvalidState` if the account is past funding
    pub fn record_funding(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
        key: IdempotencyKey,
        actor: &str,
    ) -> Result<EscrowTxId> {
        if amount <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }

        let tx_id = EscrowTxId::new();
        let store = Arc::clone(&self.store);
        self.store.with_account_mut(org_id, account_id, |account| {
            if !matches!(account.state, EscrowState::Created | EscrowState::Funded) {
                return Err(SouqpayError::EscrowInvalidState {
                    expected: "CREATED or FUNDED",
                    actual: account.state,
                });
            }

            // The idempotency gate: check-and-append is atomic, so a
            // concurrent replay cannot double-increment the account.
            store.append_transaction_unique(EscrowTransaction {
                id: tx_id,
                account_id,
                org_id,
                tx_type: EscrowTxType::Fund,
                amount,
                currency: account.currency.clone(),
                provider: None,
                idempotency_key: key.clone(),
                executed_at: Utc::now(),
            })?;

            account.funded_amount += amount;
            account.hold_amount += amount;
            account.state = EscrowState::Funded;
            account.audit(actor, "fund", None);
            verify_conserved(account)
        })?;

        self.outbox.record(SettlementEvent::EscrowFunded {
            org_id,
            account_id,
            tx_id,
            amount,
        });
        tracing::info!(account = %account_id, %amount, "escrow funded");
        Ok(tx_id)
    }

    /// Create a release request. Rejected while the account is terminal,
    /// under risk hold (without `force`), or before the auto-release date
    /// (without `force`).
    pub fn request_release(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
        force: bool,
        actor: &str,
    ) -> Result<ReleaseId> {
        if amount <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }

        let release_id = ReleaseId::new();
        let risk_flags = self.store.with_account_mut(org_id, account_id, |account| {
            if !account.state.can_transition_to(EscrowState::ReleaseRequested) {
                return Err(SouqpayError::EscrowInvalidState {
                    expected: "FUNDED",
                    actual: account.state,
                });
            }
            let mut risk_flags = Vec::new();
            if !force {
                if account.release_policy.risk_hold {
                    return Err(SouqpayError::RiskHoldActive(account_id));
                }
                if let Some(available_at) = account.release_policy.auto_release_at {
                    if Utc::now() < available_at {
                        return Err(SouqpayError::ReleaseNotDue { available_at });
                    }
                }
            } else {
                if account.release_policy.risk_hold {
                    risk_flags.push("risk_hold_overridden".to_string());
                }
                account.audit(actor, "force_request_release", None);
            }
            if account.release_policy.requires_review {
                risk_flags.push("requires_review".to_string());
            }

            account.state = EscrowState::ReleaseRequested;
            account.audit(actor, "request_release", None);
            verify_conserved(account)?;
            Ok(risk_flags)
        })?;

        self.store.insert_release(EscrowRelease {
            id: release_id,
            account_id,
            org_id,
            amount,
            status: ReleaseStatus::Requested,
            scheduled_for: None,
            risk_flags,
            requested_at: Utc::now(),
        });
        tracing::info!(account = %account_id, release = %release_id, %amount, "escrow release requested");
        Ok(release_id)
    }

    /// Release held funds to the seller. Creates a RELEASE transaction,
    /// moves the amount from hold to released, and marks the linked
    /// release request (if given) as released.
    ///
    /// # Errors
    /// - `ExcessiveRelease` if `amount > hold_amount` without `force`
    /// - `EscrowInvalidState` if the account is terminal
    /// - `DuplicateFunding` on idempotency-key replay
    pub fn release_funds(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
        release_id: Option<ReleaseId>,
        key: IdempotencyKey,
        force: bool,
        actor: &str,
    ) -> Result<EscrowTxId> {
        let tx_id = self.settle_out(
            org_id,
            account_id,
            amount,
            key,
            force,
            actor,
            EscrowTxType::Release,
        )?;

        if let Some(release_id) = release_id {
            self.store.with_release_mut(org_id, release_id, |release| {
                release.status = ReleaseStatus::Released;
                Ok(())
            })?;
        }

        self.outbox.record(SettlementEvent::EscrowReleased {
            org_id,
            account_id,
            amount,
        });
        tracing::info!(account = %account_id, %amount, "escrow released");
        Ok(tx_id)
    }

    /// Refund held funds to the buyer. Mirrors release but increments
    /// `refunded_amount` and terminates in REFUNDED.
    pub fn refund(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
        key: IdempotencyKey,
        force: bool,
        actor: &str,
    ) -> Result<EscrowTxId> {
        let tx_id = self.settle_out(
            org_id,
            account_id,
            amount,
            key,
            force,
            actor,
            EscrowTxType::Refund,
        )?;

        self.outbox.record(SettlementEvent::EscrowRefunded {
            org_id,
            account_id,
            amount,
        });
        tracing::info!(account = %account_id, %amount, "escrow refunded");
        Ok(tx_id)
    }

    /// Force FAILED from any non-terminal state. Used when a provider-side
    /// funding call is known to have failed irrecoverably.
    pub fn fail_escrow(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        reason: &str,
        actor: &str,
    ) -> Result<()> {
        self.store.with_account_mut(org_id, account_id, |account| {
            if !account.state.can_transition_to(EscrowState::Failed) {
                return Err(SouqpayError::EscrowInvalidState {
                    expected: "any non-terminal",
                    actual: account.state,
                });
            }
            account.state = EscrowState::Failed;
            account.audit(actor, "fail", Some(reason.to_string()));
            verify_conserved(account)
        })?;

        self.outbox.record(SettlementEvent::EscrowFailed {
            org_id,
            account_id,
            reason: reason.to_string(),
        });
        tracing::warn!(account = %account_id, reason, "escrow failed");
        Ok(())
    }

    pub fn get_account(&self, org_id: OrgId, account_id: EscrowAccountId) -> Result<EscrowAccount> {
        self.store.get_account(org_id, account_id)
    }

    /// Shared body of release and refund: both consume hold, differ only
    /// in which counter grows and which terminal state is reached.
    #[allow(clippy::too_many_arguments)]
    fn settle_out(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
        amount: Decimal,
        key: IdempotencyKey,
        force: bool,
        actor: &str,
        tx_type: EscrowTxType,
    ) -> Result<EscrowTxId> {
        if amount <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }

        let target = match tx_type {
            EscrowTxType::Release => EscrowState::Released,
            EscrowTxType::Refund => EscrowState::Refunded,
            EscrowTxType::Fund => {
                return Err(SouqpayError::Internal("FUND is not a settle-out type".into()));
            }
        };

        let tx_id = EscrowTxId::new();
        let store = Arc::clone(&self.store);
        self.store.with_account_mut(org_id, account_id, |account| {
            if !account.state.can_transition_to(target) {
                return Err(SouqpayError::EscrowInvalidState {
                    expected: "FUNDED or RELEASE_REQUESTED",
                    actual: account.state,
                });
            }
            if !force && amount > account.hold_amount {
                return Err(SouqpayError::ExcessiveRelease {
                    requested: amount,
                    held: account.hold_amount,
                });
            }
            if !force && account.release_policy.risk_hold && tx_type == EscrowTxType::Release {
                return Err(SouqpayError::RiskHoldActive(account_id));
            }

            store.append_transaction_unique(EscrowTransaction {
                id: tx_id,
                account_id,
                org_id,
                tx_type,
                amount,
                currency: account.currency.clone(),
                provider: None,
                idempotency_key: key.clone(),
                executed_at: Utc::now(),
            })?;

            account.hold_amount -= amount;
            match tx_type {
                EscrowTxType::Release => account.released_amount += amount,
                EscrowTxType::Refund => account.refunded_amount += amount,
                EscrowTxType::Fund => unreachable!("rejected above"),
            }
            account.state = target;
            let action = match tx_type {
                EscrowTxType::Release => "release",
                _ => "refund",
            };
            if force {
                account.audit(actor, &format!("force_{action}"), None);
            } else {
                account.audit(actor, action, None);
            }
            verify_conserved(account)
        })?;

        Ok(tx_id)
    }
}

/// Conservation gate run before any account mutation is persisted.
fn verify_conserved(account: &EscrowAccount) -> Result<()> {
    if account.is_conserved() {
        Ok(())
    } else {
        Err(SouqpayError::ConservationViolation {
            reason: format!(
                "account {}: funded {} != released {} + refunded {} + hold {}",
                account.id,
                account.funded_amount,
                account.released_amount,
                account.refunded_amount,
                account.hold_amount
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (EscrowLedger, Arc<MemoryStore>, OrgId) {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(EventOutbox::new());
        let ledger = EscrowLedger::new(Arc::clone(&store), outbox);
        (ledger, store, OrgId::new())
    }

    fn open_account(ledger: &EscrowLedger, org_id: OrgId) -> EscrowAccountId {
        ledger.create_account(EscrowContext {
            org_id,
            source: EscrowSource::Order,
            source_id: "order-1".into(),
            buyer_id: Some(BuyerId::new()),
            seller_id: Some(SellerId::new()),
            currency: "SAR".into(),
            expected_amount: Decimal::new(1000, 0),
            release_policy: ReleasePolicy::default(),
        })
    }

    fn fund(ledger: &EscrowLedger, org_id: OrgId, id: EscrowAccountId, amount: i64, key: &str) {
        ledger
            .record_funding(
                org_id,
                id,
                Decimal::new(amount, 0),
                IdempotencyKey::new(key),
                "gateway",
            )
            .unwrap();
    }

    #[test]
    fn create_account_replays_to_same_account() {
        let (ledger, _, org) = setup();
        let a = open_account(&ledger, org);
        let b = open_account(&ledger, org);
        assert_eq!(a, b);
    }

    #[test]
    fn funding_transitions_and_conserves() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");

        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.state, EscrowState::Funded);
        assert_eq!(account.funded_amount, Decimal::new(1000, 0));
        assert_eq!(account.hold_amount, Decimal::new(1000, 0));
        assert!(account.is_conserved());
    }

    #[test]
    fn duplicate_funding_key_is_replay_safe() {
        let (ledger, store, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");

        let err = ledger
            .record_funding(
                org,
                id,
                Decimal::new(1000, 0),
                IdempotencyKey::new("fund-1"),
                "gateway",
            )
            .unwrap_err();
        assert!(matches!(err, SouqpayError::DuplicateFunding { .. }));

        // Exactly one transaction, no double increment.
        assert_eq!(store.transactions_for_account(org, id).len(), 1);
        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.funded_amount, Decimal::new(1000, 0));
        assert_eq!(account.hold_amount, Decimal::new(1000, 0));
    }

    #[test]
    fn second_funding_with_new_key_accumulates() {
        let (ledger, store, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 600, "fund-1");
        fund(&ledger, org, id, 400, "fund-2");

        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.funded_amount, Decimal::new(1000, 0));
        assert_eq!(store.transactions_for_account(org, id).len(), 2);
        assert!(account.is_conserved());
    }

    #[test]
    fn each_funding_emits_its_own_event() {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(EventOutbox::new());
        let ledger = EscrowLedger::new(Arc::clone(&store), Arc::clone(&outbox));
        let org = OrgId::new();
        let id = open_account(&ledger, org);

        fund(&ledger, org, id, 600, "fund-1");
        fund(&ledger, org, id, 400, "fund-2");

        // Two fundings are two distinct lifecycle events, not a replay of one.
        assert_eq!(outbox.pending_len(), 2);
    }

    #[test]
    fn release_moves_hold_to_released() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");

        let release_id = ledger
            .request_release(org, id, Decimal::new(1000, 0), false, "processor")
            .unwrap();
        ledger
            .release_funds(
                org,
                id,
                Decimal::new(1000, 0),
                Some(release_id),
                IdempotencyKey::new("release-1"),
                false,
                "processor",
            )
            .unwrap();

        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.state, EscrowState::Released);
        assert_eq!(account.hold_amount, Decimal::ZERO);
        assert_eq!(account.released_amount, Decimal::new(1000, 0));
        assert!(account.is_conserved());

        let release = ledger.store.get_release(org, release_id).unwrap();
        assert_eq!(release.status, ReleaseStatus::Released);
    }

    #[test]
    fn over_release_rejected_without_force() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 500, "fund-1");

        let err = ledger
            .release_funds(
                org,
                id,
                Decimal::new(600, 0),
                None,
                IdempotencyKey::new("release-1"),
                false,
                "processor",
            )
            .unwrap_err();
        assert!(matches!(err, SouqpayError::ExcessiveRelease { .. }));

        // Nothing moved.
        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.hold_amount, Decimal::new(500, 0));
        assert_eq!(account.state, EscrowState::Funded);
    }

    #[test]
    fn risk_hold_blocks_release_without_force() {
        let (ledger, _, org) = setup();
        let id = ledger.create_account(EscrowContext {
            org_id: org,
            source: EscrowSource::Order,
            source_id: "order-risky".into(),
            buyer_id: None,
            seller_id: None,
            currency: "SAR".into(),
            expected_amount: Decimal::new(1000, 0),
            release_policy: ReleasePolicy {
                auto_release_at: None,
                risk_hold: true,
                requires_review: false,
            },
        });
        fund(&ledger, org, id, 1000, "fund-1");

        let err = ledger
            .request_release(org, id, Decimal::new(1000, 0), false, "processor")
            .unwrap_err();
        assert!(matches!(err, SouqpayError::RiskHoldActive(_)));

        // Force path succeeds and is audited.
        let release_id = ledger
            .request_release(org, id, Decimal::new(1000, 0), true, "ops@souqpay")
            .unwrap();
        let release = ledger.store.get_release(org, release_id).unwrap();
        assert!(release.risk_flags.contains(&"risk_hold_overridden".to_string()));

        let account = ledger.get_account(org, id).unwrap();
        assert!(account
            .audit_trail
            .iter()
            .any(|e| e.action == "force_request_release"));
    }

    #[test]
    fn release_before_auto_release_date_rejected() {
        let (ledger, _, org) = setup();
        let available_at = Utc::now() + chrono::Duration::days(3);
        let id = ledger.create_account(EscrowContext {
            org_id: org,
            source: EscrowSource::Booking,
            source_id: "booking-5".into(),
            buyer_id: None,
            seller_id: None,
            currency: "SAR".into(),
            expected_amount: Decimal::new(1000, 0),
            release_policy: ReleasePolicy {
                auto_release_at: Some(available_at),
                risk_hold: false,
                requires_review: false,
            },
        });
        fund(&ledger, org, id, 1000, "fund-1");

        let err = ledger
            .request_release(org, id, Decimal::new(1000, 0), false, "processor")
            .unwrap_err();
        assert!(matches!(err, SouqpayError::ReleaseNotDue { .. }));
    }

    #[test]
    fn refund_mirrors_release() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");

        ledger
            .refund(
                org,
                id,
                Decimal::new(1000, 0),
                IdempotencyKey::new("refund-1"),
                false,
                "support",
            )
            .unwrap();

        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.state, EscrowState::Refunded);
        assert_eq!(account.refunded_amount, Decimal::new(1000, 0));
        assert_eq!(account.hold_amount, Decimal::ZERO);
        assert!(account.is_conserved());
    }

    #[test]
    fn terminal_account_refuses_everything() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");
        ledger
            .refund(
                org,
                id,
                Decimal::new(1000, 0),
                IdempotencyKey::new("refund-1"),
                false,
                "support",
            )
            .unwrap();

        let err = ledger
            .record_funding(org, id, Decimal::ONE, IdempotencyKey::new("late"), "gateway")
            .unwrap_err();
        assert!(matches!(err, SouqpayError::EscrowInvalidState { .. }));

        let err = ledger
            .release_funds(
                org,
                id,
                Decimal::ONE,
                None,
                IdempotencyKey::new("late-2"),
                false,
                "processor",
            )
            .unwrap_err();
        assert!(matches!(err, SouqpayError::EscrowInvalidState { .. }));

        let err = ledger.fail_escrow(org, id, "too late", "ops").unwrap_err();
        assert!(matches!(err, SouqpayError::EscrowInvalidState { .. }));
    }

    #[test]
    fn fail_escrow_from_any_non_terminal() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        ledger
            .fail_escrow(org, id, "provider funding declined", "gateway")
            .unwrap();

        let account = ledger.get_account(org, id).unwrap();
        assert_eq!(account.state, EscrowState::Failed);
        assert!(account.audit_trail.iter().any(|e| e.action == "fail"));
    }

    #[test]
    fn cross_tenant_operations_refused() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);

        let other_org = OrgId::new();
        let err = ledger
            .record_funding(
                other_org,
                id,
                Decimal::new(1000, 0),
                IdempotencyKey::new("fund-x"),
                "gateway",
            )
            .unwrap_err();
        assert!(matches!(err, SouqpayError::EscrowNotFound(_)));
    }

    #[test]
    fn audit_trail_grows_with_every_mutation() {
        let (ledger, _, org) = setup();
        let id = open_account(&ledger, org);
        fund(&ledger, org, id, 1000, "fund-1");
        let release_id = ledger
            .request_release(org, id, Decimal::new(1000, 0), false, "processor")
            .unwrap();
        ledger
            .release_funds(
                org,
                id,
                Decimal::new(1000, 0),
                Some(release_id),
                IdempotencyKey::new("release-1"),
                false,
                "processor",
            )
            .unwrap();

        let account = ledger.get_account(org, id).unwrap();
        let actions: Vec<&str> = account.audit_trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["create", "fund", "request_release", "release"]);
    }
}
