//! Payment token types for AgentPay
//!
//! A token is a one-time bearer artifact binding a credential to exactly
//! one mandate and one amount. Once consumed it is permanently invalid
//! regardless of expiry.

use crate::{Amount, CredentialId, MandateId, TokenId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    SingleUse,
    MultiUse,
    Recurring,
}

/// A one-time bearer token for settlement handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentToken {
    pub id: TokenId,
    pub credential_id: CredentialId,
    pub user_id: UserId,
    pub mandate_id: MandateId,
    /// Opaque bearer value from a CSPRNG; never derived from ids or timestamps
    pub value: String,
    pub token_type: TokenType,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl PaymentToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Not consumed and not expired
    pub fn is_usable(&self) -> bool {
        !self.used && !self.is_expired()
    }
}
