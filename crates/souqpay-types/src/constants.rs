//! System-wide constants for the SouqPay settlement engine.

/// Platform commission on the item price, in basis points (10%).
pub const COMMISSION_RATE_BPS: i64 = 1000;

/// Payment gateway fee on the full order value, in basis points (2.5%).
pub const GATEWAY_FEE_RATE_BPS: i64 = 250;

/// VAT charged on the platform commission, in basis points (15%).
pub const VAT_RATE_BPS: i64 = 1500;

/// Share of the seller payout withheld as reserve, in basis points (20%).
pub const RESERVE_RATE_BPS: i64 = 2000;

/// Days after delivery before an order becomes eligible for settlement.
pub const SETTLEMENT_HOLD_DAYS: i64 = 7;

/// Days after delivery before the withheld reserve is released.
pub const RESERVE_HOLD_DAYS: i64 = 14;

/// Minimum payout amount, in whole currency units.
pub const MIN_PAYOUT_UNITS: i64 = 500;

/// Maximum transfer attempts before a payout fails terminally.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for the exponential retry backoff, in seconds.
pub const RETRY_BASE_DELAY_SECS: i64 = 60;

/// Decimal places for all monetary values. Rounding happens once, at the
/// end of each computation, never on intermediates.
pub const MONEY_DP: u32 = 2;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "SouqPay";
