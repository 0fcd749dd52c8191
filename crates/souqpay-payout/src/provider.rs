//! Bank-transfer provider seam.
//!
//! The processor talks to the outside world only through
//! [`BankTransferProvider`]; the production implementation wraps the real
//! gateway, and tests use the scripted fake below. The provider is treated
//! as unreliable and possibly slow — every call goes through the retry
//! path, and readiness is checked before any live call so misconfiguration
//! fails closed without consuming retry budget.

use rust_decimal::Decimal;
use souqpay_types::{BankAccount, ProviderConfig, ProviderMode, Result, SouqpayError};

/// Successful transfer acknowledgement.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// Provider-side transaction reference.
    pub transaction_id: String,
}

/// Provider-side status of a previously submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Settled,
    Failed,
}

/// The external money-movement interface.
pub trait BankTransferProvider: Send + Sync {
    /// Submit a transfer. A declined or unreachable provider surfaces as
    /// `TransferDeclined` / `ProviderUnavailable`, both retryable.
    fn transfer(
        &self,
        amount: Decimal,
        currency: &str,
        beneficiary: &BankAccount,
        reference: &str,
    ) -> Result<TransferReceipt>;

    /// Reconciliation lookup for a submitted transfer.
    fn query_status(&self, transaction_id: &str) -> Result<TransferStatus>;
}

/// Fail closed on misconfiguration, before any live call.
///
/// # Errors
/// - `IntegrationDisabled` when the integration toggle is off
/// - `IntegrationNotConfigured` when credentials are missing
/// - `IntegrationNotAvailable` when live mode is not cleared
pub fn check_readiness(config: &ProviderConfig) -> Result<()> {
    if !config.enabled {
        return Err(SouqpayError::IntegrationDisabled);
    }
    if config.api_key.is_none() {
        return Err(SouqpayError::IntegrationNotConfigured);
    }
    if config.mode == ProviderMode::Live && !config.live_enabled {
        return Err(SouqpayError::IntegrationNotAvailable);
    }
    Ok(())
}

/// Scripted in-memory provider for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use rust_decimal::Decimal;
    use souqpay_types::{BankAccount, Result, SouqpayError};

    use super::{BankTransferProvider, TransferReceipt, TransferStatus};

    /// Succeeds by default; failures are scripted per call.
    #[derive(Default)]
    pub struct FakeBankProvider {
        calls: AtomicU64,
        scripted_failures: Mutex<VecDeque<SouqpayError>>,
        transfers: Mutex<Vec<(Decimal, String, String)>>,
        on_transfer: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl FakeBankProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The next transfer call fails with the given error.
        pub fn script_failure(&self, err: SouqpayError) {
            self.scripted_failures.lock().unwrap().push_back(err);
        }

        /// The next `n` transfer calls are declined.
        pub fn decline_next(&self, n: usize) {
            let mut failures = self.scripted_failures.lock().unwrap();
            for _ in 0..n {
                failures.push_back(SouqpayError::TransferDeclined {
                    code: "51".into(),
                    message: "insufficient funds at provider".into(),
                });
            }
        }

        /// Runs `hook` at the start of the next transfer call. Lets a test
        /// interleave store activity with an in-flight transfer.
        pub fn on_next_transfer(&self, hook: impl FnOnce() + Send + 'static) {
            *self.on_transfer.lock().unwrap() = Some(Box::new(hook));
        }

        /// Total transfer invocations, successful or not.
        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        /// Successful transfers as `(amount, currency, reference)`.
        pub fn transfers(&self) -> Vec<(Decimal, String, String)> {
            self.transfers.lock().unwrap().clone()
        }
    }

    impl BankTransferProvider for FakeBankProvider {
        fn transfer(
            &self,
            amount: Decimal,
            currency: &str,
            _beneficiary: &BankAccount,
            reference: &str,
        ) -> Result<TransferReceipt> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(hook) = self.on_transfer.lock().unwrap().take() {
                hook();
            }
            if let Some(err) = self.scripted_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.transfers.lock().unwrap().push((
                amount,
                currency.to_string(),
                reference.to_string(),
            ));
            Ok(TransferReceipt {
                transaction_id: format!("TXN-{call:06}"),
            })
        }

        fn query_status(&self, _transaction_id: &str) -> Result<TransferStatus> {
            Ok(TransferStatus::Settled)
        }
    }
}
