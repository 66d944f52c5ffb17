//! AgentPay Token Issuer
//!
//! Mints short-lived, single-use tokens binding a credential to a
//! specific mandate and amount, and tracks consumption.
//!
//! # Invariants
//!
//! 1. Token values come from the OS CSPRNG, never from predictable input
//! 2. Once `used` is set the token is permanently invalid regardless of
//!    expiry
//! 3. Consumption is an atomic check-and-flip: two concurrent consume
//!    calls cannot both observe a usable token

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use agentpay_credentials::CredentialStore;
use agentpay_crypto::generate_token_value;
use agentpay_types::{
    AgentPayError, Amount, CredentialId, MandateId, PaymentMethodType, PaymentToken, Result,
    TokenId, TokenType,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Decrypted instrument data released only on consumption
///
/// Kept in its own type so the sensitive payload stays namespaced away
/// from the display envelope; the Debug impl redacts it so a consumed
/// token can be logged safely.
pub struct SensitivePayload(serde_json::Value);

impl SensitivePayload {
    /// Access the raw instrument data for the payment processor handoff
    pub fn expose(&self) -> &serde_json::Value {
        &self.0
    }
}

impl fmt::Debug for SensitivePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitivePayload(<redacted>)")
    }
}

/// Result of consuming a token: display-safe envelope plus the
/// separately namespaced sensitive payload
#[derive(Debug)]
pub struct ConsumedToken {
    pub token_id: TokenId,
    pub credential_id: CredentialId,
    pub mandate_id: MandateId,
    pub method_type: PaymentMethodType,
    pub brand: String,
    pub last_four: String,
    pub amount: Amount,
    pub used_at: DateTime<Utc>,
    /// Decrypted instrument data; never include this in logs or payloads
    pub credential_data: SensitivePayload,
}

impl ConsumedToken {
    /// The loggable half of the consumption result
    pub fn display_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "token_id": self.token_id.to_string(),
            "credential_id": self.credential_id.to_string(),
            "mandate_id": self.mandate_id.to_string(),
            "type": self.method_type.as_str(),
            "brand": self.brand,
            "last_four": self.last_four,
            "amount": self.amount.to_major(),
            "currency": self.amount.currency.code(),
            "used_at": self.used_at.to_rfc3339(),
        })
    }
}

/// The AgentPay token issuer
pub struct TokenIssuer {
    credentials: Arc<CredentialStore>,
    tokens: Arc<RwLock<HashMap<TokenId, PaymentToken>>>,
}

impl TokenIssuer {
    /// Create an issuer backed by the given credential store
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mint a single-use token binding a credential to one mandate/amount
    ///
    /// Fails when the credential does not exist or cannot carry the
    /// transaction (validity, currency, amount bounds).
    pub async fn issue_token(
        &self,
        credential_id: &CredentialId,
        mandate_id: &MandateId,
        amount: Amount,
        ttl: Duration,
    ) -> Result<PaymentToken> {
        let credential = self
            .credentials
            .get_credential(credential_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Credential", credential_id.to_string()))?;

        if let Err(e) = credential.supports_transaction(&amount) {
            warn!(
                "Token issuance refused for credential {}: {}",
                credential_id, e
            );
            return Err(e);
        }

        let now = Utc::now();
        let token = PaymentToken {
            id: TokenId::new(),
            credential_id: credential_id.clone(),
            user_id: credential.user_id.clone(),
            mandate_id: mandate_id.clone(),
            value: generate_token_value(),
            token_type: TokenType::SingleUse,
            amount,
            created_at: now,
            expires_at: now + ttl,
            used: false,
            used_at: None,
        };

        let mut tokens = self.tokens.write().await;
        tokens.insert(token.id.clone(), token.clone());
        info!(
            "Token issued: {} for credential {} on mandate {}",
            token.id, credential_id, mandate_id
        );
        Ok(token)
    }

    /// Token exists, is unconsumed and not past expiry
    pub async fn validate(&self, token_id: &TokenId) -> bool {
        self.tokens
            .read()
            .await
            .get(token_id)
            .map(|t| t.is_usable())
            .unwrap_or(false)
    }

    /// Get a token snapshot by id
    pub async fn get_token(&self, token_id: &TokenId) -> Option<PaymentToken> {
        self.tokens.read().await.get(token_id).cloned()
    }

    /// Consume a token exactly once
    ///
    /// Validity re-check and the used flip happen under one write guard,
    /// so a second concurrent consume observes `used = true` and fails.
    /// The bound credential's instrument data is decrypted for the
    /// processor handoff and returned separately from the display
    /// envelope.
    pub async fn consume(&self, token_id: &TokenId) -> Result<ConsumedToken> {
        let mut tokens = self.tokens.write().await;

        let token = tokens.get(token_id).ok_or_else(|| AgentPayError::TokenInvalid {
            token_id: token_id.to_string(),
            reason: "token not found".to_string(),
        })?;

        if token.used {
            return Err(AgentPayError::TokenInvalid {
                token_id: token_id.to_string(),
                reason: "token already consumed".to_string(),
            });
        }
        if token.is_expired() {
            return Err(AgentPayError::TokenInvalid {
                token_id: token_id.to_string(),
                reason: "token expired".to_string(),
            });
        }

        let credential_id = token.credential_id.clone();
        let credential = self
            .credentials
            .get_credential(&credential_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Credential", credential_id.to_string()))?;
        let credential_data = self
            .credentials
            .decrypt_credential_data(&credential_id)
            .await?;

        // All checks passed; flip the flag while still holding the guard
        let used_at = Utc::now();
        let token = tokens
            .get_mut(token_id)
            .ok_or_else(|| AgentPayError::internal("token vanished during consumption"))?;
        token.used = true;
        token.used_at = Some(used_at);

        info!("Token consumed: {} for mandate {}", token.id, token.mandate_id);
        Ok(ConsumedToken {
            token_id: token.id.clone(),
            credential_id,
            mandate_id: token.mandate_id.clone(),
            method_type: credential.method_type,
            brand: credential.brand,
            last_four: credential.last_four,
            amount: token.amount,
            used_at,
            credential_data: SensitivePayload(credential_data),
        })
    }

    /// Remove tokens that no longer validate; returns the number removed
    ///
    /// Takes the same write lock as consume, so a token cannot be
    /// removed mid-consumption.
    pub async fn cleanup_expired(&self) -> usize {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.is_usable());
        let removed = before - tokens.len();
        if removed > 0 {
            info!("Cleaned up {} expired or consumed tokens", removed);
        }
        removed
    }
}
