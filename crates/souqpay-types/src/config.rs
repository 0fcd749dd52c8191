//! Configuration types for the settlement engine and the bank-transfer
//! provider integration.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Fee rates, holds and retry policy for one deployment.
///
/// Rates are fractions (0.10 = 10%). Defaults come from
/// [`crate::constants`]; a tenant-specific config may override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Platform commission applied to the item price.
    pub commission_rate: Decimal,
    /// Gateway fee applied to the full order value.
    pub gateway_fee_rate: Decimal,
    /// VAT applied to the platform commission.
    pub vat_rate: Decimal,
    /// Share of the seller payout withheld as reserve.
    pub reserve_rate: Decimal,
    /// Days after delivery before an order is eligible for settlement.
    pub settlement_hold_days: i64,
    /// Days after delivery before the reserve is released.
    pub reserve_hold_days: i64,
    /// Minimum payout amount.
    pub min_payout: Decimal,
    /// Maximum transfer attempts before terminal failure.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff, in seconds.
    pub retry_base_delay_secs: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(constants::COMMISSION_RATE_BPS, 4),
            gateway_fee_rate: Decimal::new(constants::GATEWAY_FEE_RATE_BPS, 4),
            vat_rate: Decimal::new(constants::VAT_RATE_BPS, 4),
            reserve_rate: Decimal::new(constants::RESERVE_RATE_BPS, 4),
            settlement_hold_days: constants::SETTLEMENT_HOLD_DAYS,
            reserve_hold_days: constants::RESERVE_HOLD_DAYS,
            min_payout: Decimal::new(constants::MIN_PAYOUT_UNITS, 0),
            max_retries: constants::DEFAULT_MAX_RETRIES,
            retry_base_delay_secs: constants::RETRY_BASE_DELAY_SECS,
        }
    }
}

impl SettlementConfig {
    /// Backoff delay before retry attempt `retry_count` (1-based):
    /// `base * 2^(retry_count - 1)`.
    #[must_use]
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        Duration::seconds(self.retry_base_delay_secs * (1_i64 << exponent))
    }
}

/// Operating mode of the bank-transfer provider integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    /// Test environment; transfers are not real money.
    Sandbox,
    /// Production environment; requires `live_enabled`.
    Live,
}

/// Bank-transfer provider configuration. Readiness is checked before every
/// live call; misconfiguration fails closed without consuming retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Integration toggle. Disabled deployments use the manual path only.
    pub enabled: bool,
    /// Provider API credential. Absent means not configured.
    pub api_key: Option<String>,
    pub mode: ProviderMode,
    /// Whether this deployment is cleared for live transfers.
    pub live_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            mode: ProviderMode::Sandbox,
            live_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates_match_constants() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.commission_rate, Decimal::new(10, 2));
        assert_eq!(cfg.gateway_fee_rate, Decimal::new(25, 3));
        assert_eq!(cfg.vat_rate, Decimal::new(15, 2));
        assert_eq!(cfg.reserve_rate, Decimal::new(20, 2));
        assert_eq!(cfg.min_payout, Decimal::new(500, 0));
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn retry_delay_doubles() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.retry_delay(1), Duration::seconds(60));
        assert_eq!(cfg.retry_delay(2), Duration::seconds(120));
        assert_eq!(cfg.retry_delay(3), Duration::seconds(240));
    }

    #[test]
    fn retry_delay_exponent_capped() {
        let cfg = SettlementConfig::default();
        // Pathological retry counts must not overflow the shift.
        let delay = cfg.retry_delay(10_000);
        assert!(delay > Duration::zero());
    }

    #[test]
    fn provider_config_serde_roundtrip() {
        let cfg = ProviderConfig {
            enabled: true,
            api_key: Some("sk_test_123".into()),
            mode: ProviderMode::Live,
            live_enabled: true,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, ProviderMode::Live);
        assert!(back.live_enabled);
    }
}
