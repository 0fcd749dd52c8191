//! In-memory document store with atomic conditional updates.
//!
//! Every collection operation takes the tenant (`OrgId`) as a mandatory
//! parameter and refuses to match documents across tenants — there is no
//! unscoped fallback query. Status changes that must happen at most once go
//! through compare-and-swap style methods ([`MemoryStore::try_claim_payout`],
//! [`MemoryStore::cas_statement_status`]); a zero-match result means
//! "already handled", never an error requiring special handling.
//!
//! Each collection sits behind its own mutex, held only for the duration of
//! a single atomic operation. Multiple worker threads may call any method
//! concurrently; no caller-side locking is required or expected.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use souqpay_types::{
    BatchJobId, BatchPayoutJob, DeliveredOrder, EscrowAccount, EscrowAccountId, EscrowRelease,
    EscrowSource, EscrowTransaction, OrderId, OrgId, PayoutId, PayoutRequest, PayoutStatus,
    ReleaseId, Result, SellerId, SettlementStatement, SouqpayError, StatementId, StatementStatus,
    Withdrawal, WithdrawalId,
};

/// Acquire a collection mutex, recovering from poisoning. A panicked
/// writer leaves the document map intact, so the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The settlement document store.
///
/// The reference implementation keeps everything in memory; a deployment
/// backs the same methods with a document database whose conditional
/// update primitive replaces the per-collection mutex.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<EscrowAccountId, EscrowAccount>>,
    transactions: Mutex<Vec<EscrowTransaction>>,
    releases: Mutex<HashMap<ReleaseId, EscrowRelease>>,
    orders: Mutex<HashMap<OrderId, DeliveredOrder>>,
    statements: Mutex<HashMap<StatementId, SettlementStatement>>,
    payouts: Mutex<HashMap<PayoutId, PayoutRequest>>,
    withdrawals: Mutex<HashMap<WithdrawalId, Withdrawal>>,
    batch_jobs: Mutex<HashMap<BatchJobId, BatchPayoutJob>>,
    /// Per-(org, seller) available balance; credited on payout restitution.
    balances: Mutex<HashMap<(OrgId, SellerId), Decimal>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =====================================================================
    // Escrow accounts
    // =====================================================================

    /// Insert the account unless one already exists for
    /// `(org, source, source_id)`; returns the surviving account's id.
    pub fn find_or_insert_account(&self, account: EscrowAccount) -> EscrowAccountId {
        let mut accounts = lock(&self.accounts);
        if let Some(existing) = accounts.values().find(|a| {
            a.org_id == account.org_id
                && a.source == account.source
                && a.source_id == account.source_id
        }) {
            return existing.id;
        }
        let id = account.id;
        accounts.insert(id, account);
        id
    }

    pub fn get_account(&self, org_id: OrgId, id: EscrowAccountId) -> Result<EscrowAccount> {
        lock(&self.accounts)
            .get(&id)
            .filter(|a| a.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::EscrowNotFound(id))
    }

    pub fn find_account_by_source(
        &self,
        org_id: OrgId,
        source: EscrowSource,
        source_id: &str,
    ) -> Option<EscrowAccount> {
        lock(&self.accounts)
            .values()
            .find(|a| a.org_id == org_id && a.source == source && a.source_id == source_id)
            .cloned()
    }

    /// Atomically mutate an account under the collection lock. If the
    /// closure returns an error, the account is left untouched.
    pub fn with_account_mut<T>(
        &self,
        org_id: OrgId,
        id: EscrowAccountId,
        f: impl FnOnce(&mut EscrowAccount) -> Result<T>,
    ) -> Result<T> {
        let mut accounts = lock(&self.accounts);
        let account = accounts
            .get(&id)
            .filter(|a| a.org_id == org_id)
            .ok_or(SouqpayError::EscrowNotFound(id))?;
        let mut staged = account.clone();
        let value = f(&mut staged)?;
        accounts.insert(id, staged);
        Ok(value)
    }

    // =====================================================================
    // Escrow transactions (append-only)
    // =====================================================================

    /// Append a transaction unless one with the same `(account, key)`
    /// already exists. The uniqueness check and the append happen under one
    /// lock, so a concurrent replay cannot slip through.
    pub fn append_transaction_unique(&self, tx: EscrowTransaction) -> Result<()> {
        let mut transactions = lock(&self.transactions);
        if transactions
            .iter()
            .any(|t| t.account_id == tx.account_id && t.idempotency_key == tx.idempotency_key)
        {
            return Err(SouqpayError::DuplicateFunding {
                key: tx.idempotency_key,
            });
        }
        transactions.push(tx);
        Ok(())
    }

    pub fn transactions_for_account(
        &self,
        org_id: OrgId,
        account_id: EscrowAccountId,
    ) -> Vec<EscrowTransaction> {
        lock(&self.transactions)
            .iter()
            .filter(|t| t.org_id == org_id && t.account_id == account_id)
            .cloned()
            .collect()
    }

    // =====================================================================
    // Escrow releases
    // =====================================================================

    pub fn insert_release(&self, release: EscrowRelease) {
        lock(&self.releases).insert(release.id, release);
    }

    pub fn with_release_mut<T>(
        &self,
        org_id: OrgId,
        id: ReleaseId,
        f: impl FnOnce(&mut EscrowRelease) -> Result<T>,
    ) -> Result<T> {
        let mut releases = lock(&self.releases);
        let release = releases
            .get(&id)
            .filter(|r| r.org_id == org_id)
            .ok_or(SouqpayError::ReleaseNotFound)?;
        let mut staged = release.clone();
        let value = f(&mut staged)?;
        releases.insert(id, staged);
        Ok(value)
    }

    pub fn get_release(&self, org_id: OrgId, id: ReleaseId) -> Result<EscrowRelease> {
        lock(&self.releases)
            .get(&id)
            .filter(|r| r.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::ReleaseNotFound)
    }

    // =====================================================================
    // Delivered orders
    // =====================================================================

    pub fn insert_order(&self, order: DeliveredOrder) {
        lock(&self.orders).insert(order.id, order);
    }

    /// All delivered orders for a seller, tenant-scoped. Callers filter by
    /// period and eligibility.
    pub fn delivered_orders(&self, org_id: OrgId, seller_id: SellerId) -> Vec<DeliveredOrder> {
        let mut orders: Vec<DeliveredOrder> = lock(&self.orders)
            .values()
            .filter(|o| o.org_id == org_id && o.seller_id == seller_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.delivered_at);
        orders
    }

    /// CAS claim of an order into a statement: succeeds only while the
    /// order is unsettled. `Ok(false)` means another statement run already
    /// claimed it — the caller skips the order, it is not an error.
    pub fn try_settle_order(
        &self,
        org_id: OrgId,
        id: OrderId,
        statement_id: StatementId,
    ) -> Result<bool> {
        let mut orders = lock(&self.orders);
        let order = orders
            .get_mut(&id)
            .filter(|o| o.org_id == org_id)
            .ok_or_else(|| SouqpayError::Internal(format!("order {id} not found")))?;
        if order.settled_in.is_some() {
            return Ok(false);
        }
        order.settled_in = Some(statement_id);
        Ok(true)
    }

    pub fn with_order_mut<T>(
        &self,
        org_id: OrgId,
        id: OrderId,
        f: impl FnOnce(&mut DeliveredOrder) -> Result<T>,
    ) -> Result<T> {
        let mut orders = lock(&self.orders);
        let order = orders
            .get(&id)
            .filter(|o| o.org_id == org_id)
            .ok_or(SouqpayError::Internal(format!("order {id} not found")))?;
        let mut staged = order.clone();
        let value = f(&mut staged)?;
        orders.insert(id, staged);
        Ok(value)
    }

    // =====================================================================
    // Settlement statements
    // =====================================================================

    pub fn insert_statement(&self, statement: SettlementStatement) {
        lock(&self.statements).insert(statement.id, statement);
    }

    pub fn get_statement(&self, org_id: OrgId, id: StatementId) -> Result<SettlementStatement> {
        lock(&self.statements)
            .get(&id)
            .filter(|s| s.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::StatementNotFound(id))
    }

    pub fn with_statement_mut<T>(
        &self,
        org_id: OrgId,
        id: StatementId,
        f: impl FnOnce(&mut SettlementStatement) -> Result<T>,
    ) -> Result<T> {
        let mut statements = lock(&self.statements);
        let statement = statements
            .get(&id)
            .filter(|s| s.org_id == org_id)
            .ok_or(SouqpayError::StatementNotFound(id))?;
        let mut staged = statement.clone();
        let value = f(&mut staged)?;
        statements.insert(id, staged);
        Ok(value)
    }

    /// Conditional status transition: succeeds only when the statement is
    /// currently in `from`. The mismatch error carries both states so
    /// callers can branch without string matching.
    pub fn cas_statement_status(
        &self,
        org_id: OrgId,
        id: StatementId,
        from: StatementStatus,
        to: StatementStatus,
    ) -> Result<()> {
        let mut statements = lock(&self.statements);
        let statement = statements
            .get_mut(&id)
            .filter(|s| s.org_id == org_id)
            .ok_or(SouqpayError::StatementNotFound(id))?;
        if statement.status != from {
            return Err(SouqpayError::StatementInvalidState {
                expected: from,
                actual: statement.status,
            });
        }
        statement.status = to;
        Ok(())
    }

    /// The seller's most recently approved statement, if any.
    pub fn latest_approved_statement(
        &self,
        org_id: OrgId,
        seller_id: SellerId,
    ) -> Option<SettlementStatement> {
        lock(&self.statements)
            .values()
            .filter(|s| {
                s.org_id == org_id
                    && s.seller_id == seller_id
                    && s.status == StatementStatus::Approved
            })
            .max_by_key(|s| s.period.end)
            .cloned()
    }

    // =====================================================================
    // Payout requests
    // =====================================================================

    /// Insert a payout, enforcing at most one active (pending/processing)
    /// payout per statement. Check and insert happen under one lock.
    pub fn insert_payout_unique_active(&self, payout: PayoutRequest) -> Result<()> {
        let mut payouts = lock(&self.payouts);
        if payouts.values().any(|p| {
            p.org_id == payout.org_id
                && p.statement_id == payout.statement_id
                && p.status.is_active()
        }) {
            return Err(SouqpayError::DuplicateActivePayout(payout.statement_id));
        }
        payouts.insert(payout.id, payout);
        Ok(())
    }

    pub fn get_payout(&self, org_id: OrgId, id: PayoutId) -> Result<PayoutRequest> {
        lock(&self.payouts)
            .get(&id)
            .filter(|p| p.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::PayoutNotFound(id))
    }

    /// The distributed claim: `pending -> processing` only if the payout is
    /// currently pending. `Ok(false)` means another worker already holds it
    /// or it reached a terminal state.
    pub fn try_claim_payout(&self, org_id: OrgId, id: PayoutId) -> Result<bool> {
        let mut payouts = lock(&self.payouts);
        let payout = payouts
            .get_mut(&id)
            .filter(|p| p.org_id == org_id)
            .ok_or(SouqpayError::PayoutNotFound(id))?;
        if payout.status != PayoutStatus::Pending {
            return Ok(false);
        }
        payout.status = PayoutStatus::Processing;
        Ok(true)
    }

    pub fn with_payout_mut<T>(
        &self,
        org_id: OrgId,
        id: PayoutId,
        f: impl FnOnce(&mut PayoutRequest) -> Result<T>,
    ) -> Result<T> {
        let mut payouts = lock(&self.payouts);
        let payout = payouts
            .get(&id)
            .filter(|p| p.org_id == org_id)
            .ok_or(SouqpayError::PayoutNotFound(id))?;
        let mut staged = payout.clone();
        let value = f(&mut staged)?;
        payouts.insert(id, staged);
        Ok(value)
    }

    /// Atomically claim every due pending payout for a batch run by
    /// stamping the batch job id. A payout already stamped (and not since
    /// reset to pending by the retry path) is skipped, so a second
    /// concurrent scheduler invocation claims nothing.
    pub fn claim_due_payouts(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
        batch_id: BatchJobId,
    ) -> Vec<PayoutId> {
        let mut payouts = lock(&self.payouts);
        let mut claimed = Vec::new();
        for payout in payouts.values_mut() {
            let due = payout.next_attempt_at.is_none_or(|at| at <= now);
            if payout.org_id == org_id
                && payout.status == PayoutStatus::Pending
                && payout.batch_job_id.is_none()
                && !payout.retries_exhausted()
                && due
            {
                payout.batch_job_id = Some(batch_id);
                claimed.push(payout.id);
            }
        }
        claimed.sort();
        claimed
    }

    // =====================================================================
    // Withdrawals
    // =====================================================================

    pub fn insert_withdrawal(&self, withdrawal: Withdrawal) {
        lock(&self.withdrawals).insert(withdrawal.id, withdrawal);
    }

    pub fn get_withdrawal(&self, org_id: OrgId, id: WithdrawalId) -> Result<Withdrawal> {
        lock(&self.withdrawals)
            .get(&id)
            .filter(|w| w.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::WithdrawalNotFound(id))
    }

    pub fn with_withdrawal_mut<T>(
        &self,
        org_id: OrgId,
        id: WithdrawalId,
        f: impl FnOnce(&mut Withdrawal) -> Result<T>,
    ) -> Result<T> {
        let mut withdrawals = lock(&self.withdrawals);
        let withdrawal = withdrawals
            .get(&id)
            .filter(|w| w.org_id == org_id)
            .ok_or(SouqpayError::WithdrawalNotFound(id))?;
        let mut staged = withdrawal.clone();
        let value = f(&mut staged)?;
        withdrawals.insert(id, staged);
        Ok(value)
    }

    /// Withdrawals drawn against a statement, excluding failed/cancelled
    /// ones (those never left the balance).
    pub fn withdrawn_against(&self, org_id: OrgId, statement_id: StatementId) -> Decimal {
        lock(&self.withdrawals)
            .values()
            .filter(|w| {
                w.org_id == org_id
                    && w.statement_id == statement_id
                    && !matches!(w.status, PayoutStatus::Failed | PayoutStatus::Cancelled)
            })
            .map(|w| w.amount)
            .sum()
    }

    // =====================================================================
    // Batch jobs
    // =====================================================================

    pub fn insert_batch_job(&self, job: BatchPayoutJob) {
        lock(&self.batch_jobs).insert(job.id, job);
    }

    pub fn get_batch_job(&self, org_id: OrgId, id: BatchJobId) -> Result<BatchPayoutJob> {
        lock(&self.batch_jobs)
            .get(&id)
            .filter(|j| j.org_id == org_id)
            .cloned()
            .ok_or(SouqpayError::Internal(format!("batch job {id} not found")))
    }

    pub fn with_batch_job_mut<T>(
        &self,
        org_id: OrgId,
        id: BatchJobId,
        f: impl FnOnce(&mut BatchPayoutJob) -> Result<T>,
    ) -> Result<T> {
        let mut jobs = lock(&self.batch_jobs);
        let job = jobs
            .get(&id)
            .filter(|j| j.org_id == org_id)
            .ok_or_else(|| SouqpayError::Internal(format!("batch job {id} not found")))?;
        let mut staged = job.clone();
        let value = f(&mut staged)?;
        jobs.insert(id, staged);
        Ok(value)
    }

    // =====================================================================
    // Seller balances
    // =====================================================================

    /// Credit the seller's available balance (payout restitution).
    pub fn credit_seller(&self, org_id: OrgId, seller_id: SellerId, amount: Decimal) {
        let mut balances = lock(&self.balances);
        *balances.entry((org_id, seller_id)).or_insert(Decimal::ZERO) += amount;
    }

    pub fn seller_balance(&self, org_id: OrgId, seller_id: SellerId) -> Decimal {
        lock(&self.balances)
            .get(&(org_id, seller_id))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
