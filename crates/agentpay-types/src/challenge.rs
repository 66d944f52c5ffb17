//! OTP challenge types for AgentPay
//!
//! A challenge is a short-lived numeric code bound to a mandate and a
//! chosen payment method. The state machine is
//! `Issued -> {Verified, Expired, Exhausted}`; terminal states absorb
//! all further verification attempts.

use crate::{ChallengeId, CredentialId, MandateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Challenge state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Issued,
    Verified,
    Expired,
    Exhausted,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Verified => "verified",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
        }
    }

    /// Terminal states accept no further verification attempts
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Issued)
    }
}

/// A numeric challenge gating settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub id: ChallengeId,
    /// Fixed-width numeric code from a CSPRNG
    pub code: String,
    pub mandate_id: MandateId,
    pub method_ref: CredentialId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
    pub state: ChallengeState,
}

impl OtpChallenge {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
