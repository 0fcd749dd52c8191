//! Globally unique identifiers used throughout SouqPay.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! Every settlement entity is additionally scoped by an [`OrgId`] — there
//! is no organization-less default anywhere in the system.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if $prefix.is_empty() {
                    write!(f, "{}", self.0)
                } else {
                    write!(f, "{}:{}", $prefix, self.0)
                }
            }
        }
    };
}

uuid_id!(
    /// Tenant identifier. Mandatory on every read and write.
    OrgId,
    "org"
);

uuid_id!(
    /// Unique identifier for a marketplace seller.
    SellerId,
    "seller"
);

uuid_id!(
    /// Unique identifier for a marketplace buyer.
    BuyerId,
    "buyer"
);

uuid_id!(
    /// Unique identifier for a marketplace order.
    OrderId,
    ""
);

uuid_id!(
    /// Unique identifier for an escrow account.
    EscrowAccountId,
    "esc"
);

uuid_id!(
    /// Unique identifier for an immutable escrow transaction.
    EscrowTxId,
    "etx"
);

uuid_id!(
    /// Unique identifier for an escrow release request.
    ReleaseId,
    "rel"
);

uuid_id!(
    /// Unique identifier for a settlement statement.
    StatementId,
    "stmt"
);

uuid_id!(
    /// Unique identifier for a payout request.
    PayoutId,
    "payout"
);

uuid_id!(
    /// Unique identifier for an ad-hoc withdrawal.
    WithdrawalId,
    "wd"
);

uuid_id!(
    /// Unique identifier for a scheduled batch payout run.
    BatchJobId,
    "batch"
);

/// Caller-supplied idempotency token. A repeated request carrying the same
/// key has the same effect as a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(PayoutId::new(), PayoutId::new());
        assert_ne!(EscrowAccountId::new(), EscrowAccountId::new());
        assert_ne!(OrgId::new(), OrgId::new());
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = StatementId::new();
        let b = StatementId::new();
        assert!(a < b);
    }

    #[test]
    fn display_carries_prefix() {
        let id = EscrowAccountId::new();
        assert!(format!("{id}").starts_with("esc:"));
        let id = BatchJobId::new();
        assert!(format!("{id}").starts_with("batch:"));
    }

    #[test]
    fn serde_roundtrips() {
        let id = PayoutId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: PayoutId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let key = IdempotencyKey::new("fund:order-1:attempt-1");
        let json = serde_json::to_string(&key).unwrap();
        let back: IdempotencyKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
