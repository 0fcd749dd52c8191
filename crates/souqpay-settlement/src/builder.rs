//! Settlement statement builder.
//!
//! Aggregates a seller's eligible delivered orders for one period into a
//! draft statement of signed ledger entries, marks those orders settled,
//! and owns the draft -> pending -> approved review transitions. Reserve
//! maturity is also handled here: releasing a reserve changes eligibility
//! for the next payout, it does not move money by itself.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use souqpay_store::{EventOutbox, MemoryStore};
use souqpay_types::{
    LedgerEntry, LedgerEntryKind, OrgId, Period, Result, SellerId, SettlementEvent,
    SettlementStatement, SouqpayError, StatementId, StatementStatus, StatementSummary,
};

use crate::fees::FeeCalculator;

/// Builds and reviews settlement statements.
pub struct SettlementStatementBuilder {
    store: Arc<MemoryStore>,
    outbox: Arc<EventOutbox>,
    calculator: FeeCalculator,
}

impl SettlementStatementBuilder {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, outbox: Arc<EventOutbox>, calculator: FeeCalculator) -> Self {
        Self {
            store,
            outbox,
            calculator,
        }
    }

    /// Generate a draft statement for the seller and period.
    ///
    /// Orders delivered in the period partition into eligible and
    /// not-yet-eligible; not-yet-eligible orders stay untouched for a
    /// later run. Eligible orders are claimed one by one with a
    /// conditional settle-stamp before any ledger entry is built, and the
    /// statement is persisted last — so a statement only ever contains
    /// orders it owns, and two concurrent runs over the same orders split
    /// them instead of double-settling.
    pub fn generate_statement(
        &self,
        org_id: OrgId,
        seller_id: SellerId,
        period: Period,
    ) -> Result<SettlementStatement> {
        let now = Utc::now();
        let statement_id = StatementId::new();
        let in_period: Vec<_> = self
            .store
            .delivered_orders(org_id, seller_id)
            .into_iter()
            .filter(|o| period.contains(o.delivered_at))
            .collect();
        let (eligible, pending): (Vec<_>, Vec<_>) = in_period
            .into_iter()
            .partition(|o| self.calculator.is_eligible(o, now));

        // Claim phase: a zero-match stamp means a concurrent run owns the
        // order — skip it, it settles exactly once either way.
        let mut claimed = Vec::with_capacity(eligible.len());
        for order in eligible {
            if self.store.try_settle_order(org_id, order.id, statement_id)? {
                claimed.push(order);
            }
        }

        let mut statement = SettlementStatement {
            id: statement_id,
            org_id,
            seller_id,
            period,
            summary: StatementSummary::default(),
            entries: Vec::new(),
            status: StatementStatus::Draft,
            checksum: String::new(),
            created_at: now,
        };

        for order in &claimed {
            let fees =
                self.calculator
                    .compute_fees(order.order_value, order.item_price, order.shipping_fee)?;

            let mut push = |kind: LedgerEntryKind, amount: Decimal| {
                statement.push_entry(LedgerEntry {
                    order_id: Some(order.id),
                    kind,
                    amount,
                    note: None,
                    recorded_at: now,
                });
            };
            push(LedgerEntryKind::Sale, order.order_value);
            push(LedgerEntryKind::Commission, -fees.platform_commission);
            push(LedgerEntryKind::GatewayFee, -fees.gateway_fee);
            push(LedgerEntryKind::Vat, -fees.vat);
            push(LedgerEntryKind::ReserveHold, -fees.reserve);
            if let Some(refund) = order.refund_amount {
                push(LedgerEntryKind::Refund, -refund);
            }
            if let Some(chargeback) = order.chargeback_amount {
                push(LedgerEntryKind::Chargeback, -chargeback);
            }

            let deductions = order.refund_amount.unwrap_or(Decimal::ZERO)
                + order.chargeback_amount.unwrap_or(Decimal::ZERO);
            let summary = &mut statement.summary;
            summary.gross_sales += order.order_value;
            summary.commissions += fees.platform_commission;
            summary.gateway_fees += fees.gateway_fee;
            summary.vat += fees.vat;
            summary.refunds += deductions;
            summary.reserves += fees.reserve;
            summary.net_payout += fees.net_payout_now - deductions;
        }
        statement.checksum = statement.compute_checksum();

        self.store.insert_statement(statement.clone());
        self.outbox.record(SettlementEvent::StatementGenerated {
            org_id,
            statement_id: statement.id,
            seller_id,
            net_payout: statement.summary.net_payout,
        });
        tracing::info!(
            statement = %statement.id,
            seller = %seller_id,
            claimed = claimed.len(),
            deferred = pending.len(),
            net_payout = %statement.summary.net_payout,
            "statement generated"
        );
        Ok(statement)
    }

    /// Append a signed adjustment entry and update the net payout.
    /// Refused once the statement is terminal.
    pub fn apply_adjustment(
        &self,
        org_id: OrgId,
        statement_id: StatementId,
        amount: Decimal,
        note: &str,
    ) -> Result<()> {
        if amount == Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount });
        }
        self.store.with_statement_mut(org_id, statement_id, |statement| {
            if matches!(statement.status, StatementStatus::Paid | StatementStatus::Failed) {
                return Err(SouqpayError::StatementInvalidState {
                    expected: StatementStatus::Draft,
                    actual: statement.status,
                });
            }
            statement.push_entry(LedgerEntry {
                order_id: None,
                kind: LedgerEntryKind::Adjustment,
                amount,
                note: Some(note.to_string()),
                recorded_at: Utc::now(),
            });
            statement.summary.net_payout += amount;
            Ok(())
        })?;
        tracing::info!(statement = %statement_id, %amount, note, "adjustment applied");
        Ok(())
    }

    /// Mark matured reserves released for the seller's settled orders.
    /// Returns the total released amount. Moves no money — a released
    /// reserve becomes payable in the next statement run.
    pub fn release_reserves(&self, org_id: OrgId, seller_id: SellerId) -> Result<Decimal> {
        let now = Utc::now();
        let mut total = Decimal::ZERO;
        for order in self.store.delivered_orders(org_id, seller_id) {
            if !order.is_settled()
                || order.reserve_released
                || !self.calculator.reserve_matured(&order, now)
            {
                continue;
            }
            let fees =
                self.calculator
                    .compute_fees(order.order_value, order.item_price, order.shipping_fee)?;
            self.store.with_order_mut(org_id, order.id, |o| {
                o.reserve_released = true;
                Ok(())
            })?;
            total += fees.reserve;
        }
        if total > Decimal::ZERO {
            tracing::info!(seller = %seller_id, released = %total, "reserves released");
        }
        Ok(total)
    }

    /// Submit a draft statement for review.
    pub fn submit_statement(&self, org_id: OrgId, statement_id: StatementId) -> Result<()> {
        self.store.cas_statement_status(
            org_id,
            statement_id,
            StatementStatus::Draft,
            StatementStatus::Pending,
        )
    }

    /// Approve a pending statement, making it payable.
    pub fn approve_statement(&self, org_id: OrgId, statement_id: StatementId) -> Result<()> {
        self.store.cas_statement_status(
            org_id,
            statement_id,
            StatementStatus::Pending,
            StatementStatus::Approved,
        )?;
        tracing::info!(statement = %statement_id, "statement approved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use souqpay_types::DeliveredOrder;

    use super::*;

    fn setup() -> (SettlementStatementBuilder, Arc<MemoryStore>, OrgId, SellerId) {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(EventOutbox::new());
        let builder = SettlementStatementBuilder::new(
            Arc::clone(&store),
            outbox,
            FeeCalculator::default(),
        );
        (builder, store, OrgId::new(), SellerId::new())
    }

    fn last_month() -> Period {
        Period::new(Utc::now() - Duration::days(30), Utc::now())
    }

    fn order(org: OrgId, seller: SellerId, days: i64) -> DeliveredOrder {
        DeliveredOrder::delivered_days_ago(
            org,
            seller,
            days,
            Decimal::new(1000, 0),
            Decimal::new(900, 0),
            Decimal::new(50, 0),
        )
    }

    #[test]
    fn eligible_order_produces_full_ledger() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));

        let statement = builder.generate_statement(org, seller, last_month()).unwrap();
        assert_eq!(statement.status, StatementStatus::Draft);
        assert!(statement.checksum_valid());

        let kinds: Vec<LedgerEntryKind> = statement.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LedgerEntryKind::Sale,
                LedgerEntryKind::Commission,
                LedgerEntryKind::GatewayFee,
                LedgerEntryKind::Vat,
                LedgerEntryKind::ReserveHold,
            ]
        );
        assert_eq!(statement.summary.gross_sales, Decimal::new(1000, 0));
        assert_eq!(statement.summary.net_payout, Decimal::new(69720, 2));
    }

    #[test]
    fn ineligible_orders_are_deferred() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));
        store.insert_order(order(org, seller, 3)); // hold still active
        let mut disputed = order(org, seller, 10);
        disputed.dispute_open = true;
        store.insert_order(disputed);

        let statement = builder.generate_statement(org, seller, last_month()).unwrap();
        assert_eq!(statement.summary.gross_sales, Decimal::new(1000, 0));

        // The deferred orders stay unsettled for the next run.
        let unsettled = store
            .delivered_orders(org, seller)
            .into_iter()
            .filter(|o| !o.is_settled())
            .count();
        assert_eq!(unsettled, 2);
    }

    #[test]
    fn settled_orders_never_settle_twice() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));

        let first = builder.generate_statement(org, seller, last_month()).unwrap();
        assert_eq!(first.entries.len(), 5);

        let second = builder.generate_statement(org, seller, last_month()).unwrap();
        assert!(second.entries.is_empty(), "already-settled order must not re-enter");
        assert_eq!(second.summary.net_payout, Decimal::ZERO);
    }

    #[test]
    fn concurrent_generation_splits_orders_without_double_settling() {
        use std::sync::Barrier;

        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(EventOutbox::new());
        let builder = Arc::new(SettlementStatementBuilder::new(
            Arc::clone(&store),
            outbox,
            FeeCalculator::default(),
        ));
        let org = OrgId::new();
        let seller = SellerId::new();
        for _ in 0..20 {
            store.insert_order(order(org, seller, 8));
        }

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let builder = Arc::clone(&builder);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                builder.generate_statement(org, seller, last_month()).unwrap()
            }));
        }
        let statements: Vec<SettlementStatement> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every order settled exactly once, split between the two runs.
        let sale_entries: usize = statements
            .iter()
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.kind == LedgerEntryKind::Sale)
                    .count()
            })
            .sum();
        assert_eq!(sale_entries, 20);

        // Each statement contains only orders stamped with its own id.
        for statement in &statements {
            for entry in &statement.entries {
                let order_id = entry.order_id.unwrap();
                let stored = store
                    .delivered_orders(org, seller)
                    .into_iter()
                    .find(|o| o.id == order_id)
                    .unwrap();
                assert_eq!(stored.settled_in, Some(statement.id));
            }
        }
        assert!(store.delivered_orders(org, seller).iter().all(DeliveredOrder::is_settled));
    }

    #[test]
    fn settle_claim_is_exclusive() {
        let (_, store, org, seller) = setup();
        let o = order(org, seller, 8);
        let order_id = o.id;
        store.insert_order(o);

        let first = StatementId::new();
        let second = StatementId::new();
        assert!(store.try_settle_order(org, order_id, first).unwrap());
        assert!(
            !store.try_settle_order(org, order_id, second).unwrap(),
            "second claim must lose, not error"
        );
        let stored = store
            .delivered_orders(org, seller)
            .into_iter()
            .find(|x| x.id == order_id)
            .unwrap();
        assert_eq!(stored.settled_in, Some(first));
    }

    #[test]
    fn refund_and_chargeback_reduce_net_payout() {
        let (builder, store, org, seller) = setup();
        let mut o = order(org, seller, 8);
        o.refund_amount = Some(Decimal::new(100, 0));
        o.chargeback_amount = Some(Decimal::new(50, 0));
        store.insert_order(o);

        let statement = builder.generate_statement(org, seller, last_month()).unwrap();
        assert_eq!(statement.entries.len(), 7);
        assert_eq!(statement.summary.refunds, Decimal::new(150, 0));
        // 697.20 - 150.00
        assert_eq!(statement.summary.net_payout, Decimal::new(54720, 2));
    }

    #[test]
    fn adjustment_updates_net_and_checksum() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));
        let statement = builder.generate_statement(org, seller, last_month()).unwrap();

        builder
            .apply_adjustment(org, statement.id, Decimal::new(-2000, 2), "goodwill credit")
            .unwrap();

        let stored = store.get_statement(org, statement.id).unwrap();
        assert_eq!(stored.summary.net_payout, Decimal::new(67720, 2));
        assert!(stored.checksum_valid());
        assert_eq!(
            stored.entries.last().unwrap().kind,
            LedgerEntryKind::Adjustment
        );
    }

    #[test]
    fn adjustment_requires_existing_statement() {
        let (builder, _, org, _) = setup();
        let err = builder
            .apply_adjustment(org, StatementId::new(), Decimal::ONE, "nope")
            .unwrap_err();
        assert!(matches!(err, SouqpayError::StatementNotFound(_)));
    }

    #[test]
    fn release_reserves_only_after_maturity() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));
        store.insert_order(order(org, seller, 20));
        builder.generate_statement(org, seller, last_month()).unwrap();

        let released = builder.release_reserves(org, seller).unwrap();
        assert_eq!(released, Decimal::new(17430, 2), "only the 20-day order matured");

        // Idempotent: a second sweep finds nothing.
        let again = builder.release_reserves(org, seller).unwrap();
        assert_eq!(again, Decimal::ZERO);
    }

    #[test]
    fn review_flow_walks_the_state_machine() {
        let (builder, store, org, seller) = setup();
        store.insert_order(order(org, seller, 8));
        let statement = builder.generate_statement(org, seller, last_month()).unwrap();

        builder.submit_statement(org, statement.id).unwrap();
        builder.approve_statement(org, statement.id).unwrap();
        assert_eq!(
            store.get_statement(org, statement.id).unwrap().status,
            StatementStatus::Approved
        );

        // Approving twice is a stale transition, reported as such.
        let err = builder.approve_statement(org, statement.id).unwrap_err();
        assert!(matches!(err, SouqpayError::StatementInvalidState { .. }));
    }
}
