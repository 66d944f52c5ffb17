//! The payments gateway façade
//!
//! Composes the service instances and drives the authorization flow:
//! checkout (create + merchant-sign), token issuance, payment initiation
//! (user-sign + OTP issue), OTP submission (verify + derive payment
//! mandate + settle), refunds, and housekeeping.

use std::sync::Arc;

use agentpay_challenge::{ChallengeConfig, ChallengeController};
use agentpay_credentials::{CredentialStore, RegisterCredential};
use agentpay_crypto::{generate_otp, CredentialCipher, MandateSigner};
use agentpay_ledger::TransactionLedger;
use agentpay_mandates::{CartItemInput, MandateEngine};
use agentpay_tokens::TokenIssuer;
use agentpay_types::{
    AgentPayError, Amount, CredentialId, Currency, IntentMandate, MandateId, MandateStatus,
    MerchantId, PaymentMandate, ProductId, Result, TransactionId, UserId,
};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::payloads::{
    amount_payload, PaymentInitiationResult, PaymentMethodSummary, TokenIssuanceResult,
};

/// Counts from a housekeeping sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub mandates: usize,
    pub tokens: usize,
    pub challenges: usize,
}

/// The AgentPay payments gateway
///
/// One instance per process; every service is constructed here and
/// shared by reference. Lifetime of all state = lifetime of the gateway.
pub struct PaymentsGateway {
    config: GatewayConfig,
    credentials: Arc<CredentialStore>,
    mandates: Arc<MandateEngine>,
    tokens: Arc<TokenIssuer>,
    ledger: Arc<TransactionLedger>,
    challenges: Arc<ChallengeController>,
}

impl PaymentsGateway {
    /// Build the gateway and wire its services
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let cipher = CredentialCipher::from_hex(&config.credential_key_hex)?;
        let signer = MandateSigner::new(config.signing_secret.as_bytes());

        let credentials = Arc::new(CredentialStore::new(cipher));
        let mandates = Arc::new(MandateEngine::new(signer));
        let tokens = Arc::new(TokenIssuer::new(credentials.clone()));
        let ledger = Arc::new(TransactionLedger::new());
        let challenges = Arc::new(ChallengeController::new(
            ChallengeConfig {
                max_attempts: config.max_otp_attempts,
                expiry: config.otp_expiry(),
                code_length: 6,
            },
            tokens.clone(),
            ledger.clone(),
        ));

        info!("Payments gateway initialized (demo_mode: {})", config.demo_mode);
        Ok(Self {
            config,
            credentials,
            mandates,
            tokens,
            ledger,
            challenges,
        })
    }

    /// The underlying credential store (registration surface)
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// The underlying mandate engine
    pub fn mandates(&self) -> &Arc<MandateEngine> {
        &self.mandates
    }

    /// The underlying transaction ledger
    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    /// Register a credential through the gateway
    pub async fn register_credential(
        &self,
        request: RegisterCredential,
    ) -> Result<PaymentMethodSummary> {
        let credential = self.credentials.register_credential(request).await?;
        Ok(PaymentMethodSummary::from(&credential))
    }

    /// Checkout: create a cart mandate and merchant-sign it
    pub async fn checkout(
        &self,
        user_id: UserId,
        items: Vec<CartItemInput>,
        currency: Currency,
        merchant_id: &MerchantId,
        merchant_name: &str,
    ) -> Result<serde_json::Value> {
        let mandate = self
            .mandates
            .create_cart_mandate(user_id, items, currency, self.config.mandate_ttl())
            .await?;
        self.mandates
            .merchant_sign(&mandate.id, merchant_id, merchant_name)
            .await?;
        self.mandates.mandate_detail(&mandate.id).await
    }

    /// Eligible payment methods for a user and amount, ordered
    /// default-first then by priority
    pub async fn payment_methods(
        &self,
        user_id: &UserId,
        amount: &Amount,
    ) -> Vec<PaymentMethodSummary> {
        self.credentials
            .eligible_methods(user_id, amount, None)
            .await
            .iter()
            .map(PaymentMethodSummary::from)
            .collect()
    }

    /// Best credential for a transaction, honoring a brand hint
    pub async fn optimal_method(
        &self,
        user_id: &UserId,
        amount: &Amount,
        brand_hint: Option<&str>,
    ) -> Option<PaymentMethodSummary> {
        self.credentials
            .select_optimal(user_id, amount, None, brand_hint)
            .await
            .as_ref()
            .map(PaymentMethodSummary::from)
    }

    /// Issue a payment token for a mandate
    ///
    /// Gated on mandate validity; the token binds the credential to the
    /// mandate's total and is attached to the mandate.
    pub async fn issue_token(
        &self,
        credential_id: &CredentialId,
        mandate_id: &MandateId,
    ) -> Result<TokenIssuanceResult> {
        let token = self.issue_bound_token(credential_id, mandate_id).await?;
        Ok(TokenIssuanceResult {
            token_id: token.id.to_string(),
            credential_id: credential_id.to_string(),
            mandate_id: mandate_id.to_string(),
            amount: token.amount.to_major(),
            currency: token.amount.currency.code().to_string(),
            expires_at: token.expires_at,
            status: "issued".to_string(),
        })
    }

    async fn issue_bound_token(
        &self,
        credential_id: &CredentialId,
        mandate_id: &MandateId,
    ) -> Result<agentpay_types::PaymentToken> {
        let mandate = self
            .mandates
            .get_mandate(mandate_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;
        if mandate.is_expired() {
            return Err(AgentPayError::Expired {
                entity: "Mandate",
                id: mandate_id.to_string(),
            });
        }
        if !self.mandates.is_valid(mandate_id).await {
            return Err(AgentPayError::precondition(
                "issue_token",
                "mandate is not open for payment",
            ));
        }

        let token = self
            .tokens
            .issue_token(
                credential_id,
                mandate_id,
                mandate.total,
                self.config.token_ttl(),
            )
            .await?;
        self.mandates
            .bind_token(mandate_id, token.id.clone())
            .await?;
        Ok(token)
    }

    /// Initiate payment: user-sign the mandate and issue the OTP
    ///
    /// The user signature is taken here - the moment of interactive
    /// confirmation - chaining the merchant's earlier commitment. The
    /// raw code appears in the result only in demo mode.
    pub async fn initiate_payment(
        &self,
        mandate_id: &MandateId,
        credential_id: &CredentialId,
        user_id: &UserId,
    ) -> Result<PaymentInitiationResult> {
        let mandate = self
            .mandates
            .get_mandate(mandate_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;
        if mandate.is_expired() {
            return Err(AgentPayError::Expired {
                entity: "Mandate",
                id: mandate_id.to_string(),
            });
        }

        let credential = self
            .credentials
            .get_credential(credential_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Credential", credential_id.to_string()))?;
        if &credential.user_id != user_id {
            warn!(
                "Payment initiation rejected: credential {} not owned by {}",
                credential_id, user_id
            );
            return Err(AgentPayError::unauthorized(format!(
                "credential {credential_id} does not belong to the paying user"
            )));
        }

        let mandate = self.mandates.user_sign(mandate_id, user_id).await?;

        // Reuse a bound, still-valid token; otherwise mint one
        let token_id = match &mandate.payment_token {
            Some(token_id) if self.tokens.validate(token_id).await => token_id.clone(),
            _ => self.issue_bound_token(credential_id, mandate_id).await?.id,
        };

        let challenge = self
            .challenges
            .issue(
                mandate_id,
                credential_id,
                token_id,
                user_id.clone(),
                mandate.total,
            )
            .await;

        info!(
            "Payment initiated: mandate {} via {} for {}",
            mandate_id, credential_id, mandate.total
        );
        Ok(PaymentInitiationResult {
            mandate_id: mandate_id.to_string(),
            payment_method: PaymentMethodSummary::from(&credential),
            otp_required: true,
            otp_sent_to: masked_contact(),
            expires_in_seconds: (challenge.expires_at - challenge.issued_at).num_seconds(),
            max_attempts: challenge.attempts_remaining,
            status: MandateStatus::PendingChallenge.as_str().to_string(),
            demo_otp_code: if self.config.demo_mode {
                Some(challenge.code.clone())
            } else {
                None
            },
        })
    }

    /// Submit the OTP the user typed
    ///
    /// On success the payment mandate is derived from the fully signed
    /// cart mandate, the token is consumed and the transaction recorded;
    /// the returned payload carries the transaction id and the
    /// network-visible payment mandate.
    pub async fn submit_otp(
        &self,
        mandate_id: &MandateId,
        code: &str,
        user_id: &UserId,
    ) -> Result<serde_json::Value> {
        let mandate = self
            .mandates
            .get_mandate(mandate_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;
        if &mandate.user_id != user_id {
            warn!(
                "OTP submission rejected: {} does not own mandate {}",
                user_id, mandate_id
            );
            return Err(AgentPayError::unauthorized(format!(
                "user {user_id} does not own mandate {mandate_id}"
            )));
        }

        let success = self.challenges.verify(mandate_id, code).await?;

        let method_name = success
            .consumed_token
            .method_type
            .as_str()
            .to_ascii_uppercase();
        let payment_mandate: PaymentMandate = self
            .mandates
            .derive_payment_mandate(
                mandate_id,
                &method_name,
                Some(success.consumed_token.token_id.clone()),
            )
            .await?;
        self.mandates
            .set_status(mandate_id, MandateStatus::Completed)
            .await;

        Ok(serde_json::json!({
            "mandate_id": mandate_id.to_string(),
            "transaction_id": success.transaction.id.to_string(),
            "status": success.transaction.status.as_str(),
            "amount": amount_payload(&success.transaction.amount),
            "processed_at": success.transaction.completed_at.map(|t| t.to_rfc3339()),
            "payment_method": success.consumed_token.display_payload(),
            "payment_mandate": payment_mandate.to_network_payload(),
        }))
    }

    /// Create an intent mandate for unattended purchases
    pub async fn create_intent_mandate(
        &self,
        user_id: UserId,
        budget: Amount,
        allowed_categories: Vec<String>,
        allowed_skus: Vec<ProductId>,
        chargeable_methods: Vec<CredentialId>,
        ttl: chrono::Duration,
    ) -> Result<IntentMandate> {
        self.mandates
            .create_intent_mandate(
                user_id,
                budget,
                allowed_categories,
                allowed_skus,
                chargeable_methods,
                ttl,
            )
            .await
    }

    /// Charge under an intent mandate - no interactive confirmation
    ///
    /// Human-not-present path: the intent's standing authorization
    /// replaces the OTP gate. Budget, SKU/category allow-lists and the
    /// chargeable-method list are enforced at derivation.
    pub async fn unattended_charge(
        &self,
        mandate_id: &MandateId,
        credential_id: &CredentialId,
        amount: Amount,
        sku: Option<&ProductId>,
        category: Option<&str>,
    ) -> Result<serde_json::Value> {
        let intent = self
            .mandates
            .get_intent_mandate(mandate_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;

        let token = self
            .tokens
            .issue_token(credential_id, mandate_id, amount, self.config.token_ttl())
            .await?;

        let payment_mandate = self
            .mandates
            .derive_payment_mandate_from_intent(
                mandate_id,
                amount,
                credential_id,
                "CARD",
                Some(token.id.clone()),
                sku,
                category,
            )
            .await?;

        let consumed = self.tokens.consume(&token.id).await?;
        let transaction = self
            .ledger
            .record(
                mandate_id.clone(),
                intent.user_id.clone(),
                amount,
                credential_id.clone(),
            )
            .await?;

        info!(
            "Unattended charge settled: {} under intent {}",
            transaction.id, mandate_id
        );
        Ok(serde_json::json!({
            "mandate_id": mandate_id.to_string(),
            "transaction_id": transaction.id.to_string(),
            "status": transaction.status.as_str(),
            "amount": amount_payload(&transaction.amount),
            "payment_method": consumed.display_payload(),
            "payment_mandate": payment_mandate.to_network_payload(),
        }))
    }

    /// Transaction status for the host layer
    pub async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<serde_json::Value> {
        self.ledger.status_payload(transaction_id).await
    }

    /// Refund a completed transaction
    pub async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        reason: &str,
    ) -> Result<serde_json::Value> {
        let refund = self
            .ledger
            .process_refund(transaction_id, amount, reason)
            .await?;
        Ok(serde_json::json!({
            "refund_id": refund.id.to_string(),
            "transaction_id": transaction_id.to_string(),
            "amount": amount_payload(&refund.amount),
            "reason": refund.reason,
            "status": match refund.status {
                agentpay_types::RefundStatus::Processing => "processing",
                agentpay_types::RefundStatus::Completed => "completed",
            },
            "processed_at": refund.processed_at.map(|t| t.to_rfc3339()),
            "estimated_arrival": refund.estimated_arrival,
        }))
    }

    /// Full mandate detail payload
    pub async fn mandate_detail(&self, mandate_id: &MandateId) -> Result<serde_json::Value> {
        self.mandates.mandate_detail(mandate_id).await
    }

    /// Seed demo credentials for the given users (demo/testing aid)
    pub async fn seed_demo_users(&self, users: &[UserId]) -> Result<()> {
        self.credentials.seed_demo_credentials(users).await
    }

    /// Lazily reclaim expired mandates, tokens and challenges
    pub async fn cleanup_expired(&self) -> CleanupReport {
        CleanupReport {
            mandates: self.mandates.cleanup_expired().await,
            tokens: self.tokens.cleanup_expired().await,
            challenges: self.challenges.cleanup_expired().await,
        }
    }
}

/// Masked delivery hint - the design assumes an injected delivery
/// abstraction, so only the shape of a phone tail is shown
fn masked_contact() -> String {
    format!("***-***-{}", generate_otp(4))
}
