//! Fee computation — the pure arithmetic core of settlement.
//!
//! Given one order's value split, [`FeeCalculator::compute_fees`] produces
//! the full commission/gateway/VAT/reserve breakdown. No I/O, no clock:
//! deterministic given inputs, which is what makes settlement fixtures
//! reproducible. Rounding happens once, at the end, never on intermediates.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use souqpay_types::constants::MONEY_DP;
use souqpay_types::{DeliveredOrder, Result, SettlementConfig, SouqpayError};

/// The fee split for a single order.
///
/// All values carry exactly two decimal places. The identities
/// `total_fees == platform_commission + gateway_fee + vat` and
/// `net_payout_now == seller_payout - reserve` hold up to terminal rounding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Commission on the item price.
    pub platform_commission: Decimal,
    /// Gateway fee on the full order value.
    pub gateway_fee: Decimal,
    /// VAT on the platform commission.
    pub vat: Decimal,
    pub total_fees: Decimal,
    /// What the seller earns before the reserve is withheld.
    pub seller_payout: Decimal,
    /// Withheld until the reserve hold matures.
    pub reserve: Decimal,
    /// Payable immediately.
    pub net_payout_now: Decimal,
}

/// Applies one deployment's fee rates and hold windows.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    config: SettlementConfig,
}

impl FeeCalculator {
    #[must_use]
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Compute the fee split for one order.
    ///
    /// # Errors
    /// `InvalidAmount` when the order value is not positive.
    pub fn compute_fees(
        &self,
        order_value: Decimal,
        item_price: Decimal,
        _shipping_fee: Decimal,
    ) -> Result<FeeBreakdown> {
        if order_value <= Decimal::ZERO {
            return Err(SouqpayError::InvalidAmount { amount: order_value });
        }

        let platform_commission = item_price * self.config.commission_rate;
        let gateway_fee = order_value * self.config.gateway_fee_rate;
        let vat = platform_commission * self.config.vat_rate;
        let total_fees = platform_commission + gateway_fee + vat;
        let seller_payout = order_value - total_fees;
        let reserve = seller_payout * self.config.reserve_rate;
        let net_payout_now = seller_payout - reserve;

        Ok(FeeBreakdown {
            platform_commission: round(platform_commission),
            gateway_fee: round(gateway_fee),
            vat: round(vat),
            total_fees: round(total_fees),
            seller_payout: round(seller_payout),
            reserve: round(reserve),
            net_payout_now: round(net_payout_now),
        })
    }

    /// Settlement eligibility: the post-delivery hold has elapsed, no open
    /// dispute, and the order has not already been settled.
    #[must_use]
    pub fn is_eligible(&self, order: &DeliveredOrder, now: DateTime<Utc>) -> bool {
        let hold_over =
            now >= order.delivered_at + Duration::days(self.config.settlement_hold_days);
        hold_over && !order.dispute_open && !order.is_settled()
    }

    /// Reserve maturity: independent of the settlement hold.
    #[must_use]
    pub fn reserve_matured(&self, order: &DeliveredOrder, now: DateTime<Utc>) -> bool {
        now >= order.delivered_at + Duration::days(self.config.reserve_hold_days)
    }
}

/// Terminal 2-decimal rounding, half away from zero.
fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}
