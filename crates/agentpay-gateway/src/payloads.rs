//! Host-facing payload shapes
//!
//! The host layer serializes these; nothing here is wire framing.

use agentpay_types::{AgentPayError, Amount, PaymentCredential};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of an eligible-methods result
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodSummary {
    pub credential_id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub brand: String,
    pub last_four: String,
    pub nickname: Option<String>,
    pub is_default: bool,
}

impl From<&PaymentCredential> for PaymentMethodSummary {
    fn from(credential: &PaymentCredential) -> Self {
        Self {
            credential_id: credential.id.to_string(),
            method_type: credential.method_type.as_str().to_string(),
            brand: credential.brand.clone(),
            last_four: credential.last_four.clone(),
            nickname: credential.nickname.clone(),
            is_default: credential.is_default,
        }
    }
}

/// Token issuance result
#[derive(Debug, Clone, Serialize)]
pub struct TokenIssuanceResult {
    pub token_id: String,
    pub credential_id: String,
    pub mandate_id: String,
    pub amount: f64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub status: String,
}

/// Payment initiation result
///
/// `demo_otp_code` is populated only in demo mode; production
/// deployments receive the delivery confirmation alone.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiationResult {
    pub mandate_id: String,
    pub payment_method: PaymentMethodSummary,
    pub otp_required: bool,
    pub otp_sent_to: String,
    pub expires_in_seconds: i64,
    pub max_attempts: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_otp_code: Option<String>,
}

/// Render an error the way the host layer expects: a stable kind, the
/// message, attempts remaining when the challenge is still open, and a
/// terminal flag when it is not
pub fn error_payload(error: &AgentPayError) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "error": error.error_code(),
        "message": error.to_string(),
        "can_retry": error.is_retriable(),
    });

    match error {
        AgentPayError::InvalidCode { attempts_remaining } => {
            payload["attempts_remaining"] = serde_json::json!(attempts_remaining);
        }
        AgentPayError::AttemptsExceeded { .. }
        | AgentPayError::ChallengeClosed { .. }
        | AgentPayError::Expired { .. } => {
            payload["terminal"] = serde_json::json!(true);
        }
        _ => {}
    }
    payload
}

/// Format an amount the way payloads carry money: `{currency, amount}`
pub fn amount_payload(amount: &Amount) -> serde_json::Value {
    serde_json::json!({
        "currency": amount.currency.code(),
        "amount": amount.to_major(),
    })
}
