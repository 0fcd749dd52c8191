//! Error types for the SouqPay settlement engine.
//!
//! All errors use the `SP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (rejected synchronously, never retried)
//! - 2xx: Escrow errors
//! - 3xx: Statement errors
//! - 4xx: Payout errors
//! - 5xx: Withdrawal / bank detail errors
//! - 6xx: Provider / integration errors
//! - 7xx: Store / concurrency errors
//! - 9xx: General / internal errors
//!
//! Callers branch on variants, never on message strings. "Not found",
//! "wrong state" and "already in progress" are distinct variants so no
//! control flow ever needs to parse an error message.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    EscrowAccountId, EscrowState, IdempotencyKey, PayoutId, PayoutStatus, StatementId,
    StatementStatus, WithdrawalId,
};

/// Central error enum for all SouqPay operations.
#[derive(Debug, Error)]
pub enum SouqpayError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A monetary amount was zero or negative where a positive amount is required.
    #[error("SP_ERR_100: Invalid amount: {amount}")]
    InvalidAmount { amount: Decimal },

    /// The payout amount is below the minimum threshold.
    #[error("SP_ERR_101: Payout {amount} below minimum threshold {minimum}")]
    BelowMinimumPayout { amount: Decimal, minimum: Decimal },

    /// Bank details failed structural validation.
    #[error("SP_ERR_102: Invalid bank details: {reason}")]
    InvalidBankDetails { reason: String },

    /// The IBAN failed structural or MOD-97 checksum validation.
    #[error("SP_ERR_103: Invalid IBAN: {reason}")]
    InvalidIban { reason: String },

    // =================================================================
    // Escrow Errors (2xx)
    // =================================================================
    /// The escrow account was not found under the given tenant.
    #[error("SP_ERR_200: Escrow account not found: {0}")]
    EscrowNotFound(EscrowAccountId),

    /// The escrow account is not in a state that permits the operation.
    #[error("SP_ERR_201: Escrow in state {actual}, expected {expected}")]
    EscrowInvalidState {
        expected: &'static str,
        actual: EscrowState,
    },

    /// A transaction with this idempotency key already exists (replay).
    #[error("SP_ERR_202: Duplicate escrow transaction for idempotency key {key}")]
    DuplicateFunding { key: IdempotencyKey },

    /// Release amount exceeds the held amount and `force` was not set.
    #[error("SP_ERR_203: Release {requested} exceeds held amount {held}")]
    ExcessiveRelease { requested: Decimal, held: Decimal },

    /// The account is under a risk hold and `force` was not set.
    #[error("SP_ERR_204: Escrow account {0} is under risk hold")]
    RiskHoldActive(EscrowAccountId),

    /// The auto-release date has not been reached and `force` was not set.
    #[error("SP_ERR_205: Escrow release not due until {available_at}")]
    ReleaseNotDue { available_at: DateTime<Utc> },

    /// Money-conservation invariant would be violated — critical safety alert.
    #[error("SP_ERR_206: Escrow conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// The escrow release request was not found under the given tenant.
    #[error("SP_ERR_207: Escrow release not found")]
    ReleaseNotFound,

    // =================================================================
    // Statement Errors (3xx)
    // =================================================================
    /// The settlement statement was not found under the given tenant.
    #[error("SP_ERR_300: Statement not found: {0}")]
    StatementNotFound(StatementId),

    /// The statement is not in a state that permits the operation.
    #[error("SP_ERR_301: Statement in state {actual}, expected {expected}")]
    StatementInvalidState {
        expected: StatementStatus,
        actual: StatementStatus,
    },

    /// The post-period hold has not elapsed yet.
    #[error("SP_ERR_302: Settlement hold period active until {until}")]
    HoldPeriodActive { until: DateTime<Utc> },

    // =================================================================
    // Payout Errors (4xx)
    // =================================================================
    /// The payout request was not found under the given tenant.
    #[error("SP_ERR_400: Payout not found: {0}")]
    PayoutNotFound(PayoutId),

    /// The conditional claim matched zero documents: another worker holds
    /// the payout, or it already reached a terminal state.
    #[error("SP_ERR_401: Payout {0} is already being processed")]
    AlreadyProcessing(PayoutId),

    /// An active (pending or processing) payout already exists for the statement.
    #[error("SP_ERR_402: Active payout already exists for statement {0}")]
    DuplicateActivePayout(StatementId),

    /// The payout is not in a state that permits the operation.
    #[error("SP_ERR_403: Payout in state {actual}, expected {expected}")]
    PayoutInvalidState {
        expected: PayoutStatus,
        actual: PayoutStatus,
    },

    // =================================================================
    // Withdrawal Errors (5xx)
    // =================================================================
    /// The withdrawal was not found under the given tenant.
    #[error("SP_ERR_500: Withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    /// The requested amount exceeds the seller's available balance.
    #[error("SP_ERR_501: Insufficient available balance: requested {requested}, available {available}")]
    InsufficientAvailableBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// The seller has no approved statement to withdraw against.
    #[error("SP_ERR_502: No approved statement available for withdrawal")]
    NoApprovedStatement,

    // =================================================================
    // Provider / Integration Errors (6xx)
    // =================================================================
    /// The bank-transfer integration is disabled. Configuration error, not retryable.
    #[error("SP_ERR_600: INTEGRATION_DISABLED: bank transfer provider is disabled")]
    IntegrationDisabled,

    /// The integration is enabled but credentials are missing. Not retryable.
    #[error("SP_ERR_601: INTEGRATION_NOT_CONFIGURED: provider credentials missing")]
    IntegrationNotConfigured,

    /// The integration is enabled in a live mode this deployment does not support.
    #[error("SP_ERR_602: INTEGRATION_NOT_AVAILABLE: live mode not supported")]
    IntegrationNotAvailable,

    /// The provider declined the transfer. Retryable up to `max_retries`.
    #[error("SP_ERR_603: Transfer declined ({code}): {message}")]
    TransferDeclined { code: String, message: String },

    /// The provider was unreachable or timed out. Retryable up to `max_retries`.
    #[error("SP_ERR_604: Provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    // =================================================================
    // Store / Concurrency Errors (7xx)
    // =================================================================
    /// A document with the same unique key already exists.
    #[error("SP_ERR_700: Duplicate document in collection {collection}")]
    DuplicateDocument { collection: &'static str },

    /// A conditional update matched zero documents.
    #[error("SP_ERR_701: Conditional update matched no document in {collection}")]
    StaleUpdate { collection: &'static str },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SP_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SP_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

impl SouqpayError {
    /// True for configuration errors that must fail closed immediately —
    /// spending retry budget on these wastes operator time.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::IntegrationDisabled | Self::IntegrationNotConfigured | Self::IntegrationNotAvailable
        )
    }

    /// True for provider-side failures that the retry path may re-attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransferDeclined { .. } | Self::ProviderUnavailable { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SouqpayError>;

impl From<serde_json::Error> for SouqpayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = SouqpayError::PayoutNotFound(PayoutId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("SP_ERR_400"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = SouqpayError::InsufficientAvailableBalance {
            requested: Decimal::new(1000, 0),
            available: Decimal::new(250, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("SP_ERR_501"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("250"));
    }

    #[test]
    fn configuration_errors_fail_closed() {
        assert!(SouqpayError::IntegrationDisabled.is_configuration());
        assert!(SouqpayError::IntegrationNotConfigured.is_configuration());
        assert!(SouqpayError::IntegrationNotAvailable.is_configuration());
        assert!(!SouqpayError::IntegrationDisabled.is_retryable());
    }

    #[test]
    fn provider_errors_are_retryable() {
        let declined = SouqpayError::TransferDeclined {
            code: "51".into(),
            message: "insufficient funds".into(),
        };
        assert!(declined.is_retryable());
        assert!(!declined.is_configuration());

        let timeout = SouqpayError::ProviderUnavailable {
            reason: "connect timeout".into(),
        };
        assert!(timeout.is_retryable());
    }

    #[test]
    fn all_errors_have_sp_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(SouqpayError::IntegrationDisabled),
            Box::new(SouqpayError::NoApprovedStatement),
            Box::new(SouqpayError::RiskHoldActive(EscrowAccountId::new())),
            Box::new(SouqpayError::Internal("test".into())),
            Box::new(SouqpayError::StaleUpdate { collection: "payouts" }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("SP_ERR_"),
                "Error missing SP_ERR_ prefix: {msg}"
            );
        }
    }
}
