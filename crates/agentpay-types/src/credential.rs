//! Payment credential types for AgentPay
//!
//! A credential is a user's registered payment instrument. Display
//! fields (brand, last four, nickname) live in the clear; the instrument
//! data itself is an opaque ciphertext only the credential store's
//! cipher can open.

use crate::{AgentPayError, Amount, CredentialId, Currency, Result, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment instrument kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Wallet,
    BankTransfer,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Wallet => "wallet",
            Self::BankTransfer => "bank_transfer",
        }
    }
}

/// Credential lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Suspended,
    Expired,
}

/// Opaque encrypted instrument data
///
/// The Debug impl shows only the ciphertext length so credentials can
/// appear in logs without leaking instrument data.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob(pub Vec<u8>);

impl EncryptedBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

/// A user's registered payment instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCredential {
    pub id: CredentialId,
    pub user_id: UserId,
    pub method_type: PaymentMethodType,
    pub brand: String,
    pub last_four: String,
    pub nickname: Option<String>,
    pub encrypted_data: EncryptedBlob,
    pub is_default: bool,
    /// Higher is preferred when no default applies
    pub priority: u32,
    pub supported_currencies: Vec<Currency>,
    pub max_transaction_amount: Option<Amount>,
    pub min_transaction_amount: Option<Amount>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PaymentCredential {
    /// Status active and not past expiry
    pub fn is_valid(&self) -> bool {
        if self.status != CredentialStatus::Active {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => Utc::now() <= expires_at,
            None => true,
        }
    }

    /// Check whether this credential can carry a transaction
    ///
    /// Validity, currency support and min/max bounds, in that order.
    pub fn supports_transaction(&self, amount: &Amount) -> Result<()> {
        if !self.is_valid() {
            return Err(AgentPayError::validation(
                "credential",
                format!("credential {} is not active", self.id),
            ));
        }
        if !self.supported_currencies.contains(&amount.currency) {
            return Err(AgentPayError::validation(
                "currency",
                format!("{} not supported by credential {}", amount.currency, self.id),
            ));
        }
        if let Some(max) = self.max_transaction_amount {
            if amount.currency == max.currency && amount.minor > max.minor {
                return Err(AgentPayError::validation(
                    "amount",
                    format!("{} exceeds the credential limit of {}", amount, max),
                ));
            }
        }
        if let Some(min) = self.min_transaction_amount {
            if amount.currency == min.currency && amount.minor < min.minor {
                return Err(AgentPayError::validation(
                    "amount",
                    format!("{} is below the credential minimum of {}", amount, min),
                ));
            }
        }
        Ok(())
    }
}
