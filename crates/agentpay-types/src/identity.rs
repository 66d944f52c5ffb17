//! Identity types for AgentPay
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

// Actor identity types
define_id_type!(UserId, "user", "Unique identifier for a shopper");
define_id_type!(MerchantId, "merchant", "Unique identifier for a merchant");
define_id_type!(ProductId, "prod", "Unique identifier for a catalog product");

// Authorization identity types
define_id_type!(MandateId, "mandate", "Unique identifier for a cart or intent mandate");
define_id_type!(PaymentMandateId, "pmandate", "Unique identifier for a derived payment mandate");
define_id_type!(CredentialId, "cred", "Unique identifier for a stored payment credential");
define_id_type!(TokenId, "tok", "Unique identifier for a payment token");
define_id_type!(ChallengeId, "otp", "Unique identifier for an OTP challenge");

// Settlement identity types
define_id_type!(TransactionId, "txn", "Unique identifier for a completed transaction");
define_id_type!(RefundId, "rfnd", "Unique identifier for a refund request");
