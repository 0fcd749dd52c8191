//! Delivered-order snapshot consumed by the statement builder.
//!
//! The surrounding commerce system owns the full order document; settlement
//! only sees this projection of delivered orders and stamps two fields back
//! onto it: which statement settled the order, and whether its reserve has
//! been released.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BuyerId, OrderId, OrgId, SellerId, StatementId};

/// A delivered order awaiting (or past) settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredOrder {
    pub id: OrderId,
    pub org_id: OrgId,
    pub seller_id: SellerId,
    pub buyer_id: BuyerId,
    pub currency: String,
    /// Total collected from the buyer, shipping included.
    pub order_value: Decimal,
    /// Item subtotal — the commission base.
    pub item_price: Decimal,
    pub shipping_fee: Decimal,
    pub delivered_at: DateTime<Utc>,
    /// An open dispute blocks eligibility until resolved.
    pub dispute_open: bool,
    /// Refund issued against this order, if any.
    pub refund_amount: Option<Decimal>,
    /// Chargeback raised against this order, if any.
    pub chargeback_amount: Option<Decimal>,
    /// The statement that settled this order. An order settles exactly once.
    pub settled_in: Option<StatementId>,
    /// Whether the withheld reserve has matured and been released.
    pub reserve_released: bool,
}

impl DeliveredOrder {
    /// True once the order is included in a statement.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled_in.is_some()
    }
}

/// Fixture constructor for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl DeliveredOrder {
    /// An order delivered `days` days ago with the given value split.
    #[must_use]
    pub fn delivered_days_ago(
        org_id: OrgId,
        seller_id: SellerId,
        days: i64,
        order_value: Decimal,
        item_price: Decimal,
        shipping_fee: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            org_id,
            seller_id,
            buyer_id: BuyerId::new(),
            currency: "SAR".into(),
            order_value,
            item_price,
            shipping_fee,
            delivered_at: Utc::now() - chrono::Duration::days(days),
            dispute_open: false,
            refund_amount: None,
            chargeback_amount: None,
            settled_in: None,
            reserve_released: false,
        }
    }
}
