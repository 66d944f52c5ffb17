//! AgentPay Mandate Engine
//!
//! Creates cart mandates, enforces the merchant-then-user signing order,
//! derives payment mandates once fully signed, and exposes validity and
//! expiry checks. Intent mandates (unattended authorizations) take a
//! single user signature at creation instead of the two-phase flow.
//!
//! # Signing order
//!
//! The merchant must commit to cart contents and price before the user
//! is asked to approve. The user's payload chains the merchant
//! signature, so neither party can alter terms after the counterpart
//! has signed.

use std::collections::HashMap;
use std::sync::Arc;

use agentpay_crypto::{generate_nonce, signer::SIGNATURE_ALGORITHM, MandateSigner};
use agentpay_types::{
    AgentPayError, Amount, CartMandate, CredentialId, Currency, IntentMandate, LineItem,
    MandateId, MandateStatus, MerchantId, PartyRef, PaymentMandate, PaymentMandateContents,
    PaymentMandateId, PaymentResponse, ProductId, Result, SignatureSlot, TokenId,
    TransactionModality, UserId,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One cart line as supplied by the catalog layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemInput {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Amount,
    pub quantity: u32,
}

/// Canonical merchant signing payload; field order is the wire order
#[derive(Serialize)]
struct MerchantSignPayload<'a> {
    mandate_id: String,
    merchant_id: String,
    total_minor: i64,
    currency: &'a str,
    item_count: usize,
    timestamp: String,
    nonce: &'a str,
    role: &'a str,
}

/// Canonical user signing payload; chains the merchant signature
#[derive(Serialize)]
struct UserSignPayload<'a> {
    mandate_id: String,
    user_id: String,
    total_minor: i64,
    currency: &'a str,
    merchant_signature: &'a str,
    timestamp: String,
    nonce: &'a str,
    role: &'a str,
}

/// Canonical intent-authorization payload
#[derive(Serialize)]
struct IntentSignPayload<'a> {
    mandate_id: String,
    user_id: String,
    budget_minor: i64,
    currency: &'a str,
    expires_at: String,
    nonce: &'a str,
    role: &'a str,
}

#[derive(Default)]
struct EngineState {
    cart_mandates: HashMap<MandateId, CartMandate>,
    intent_mandates: HashMap<MandateId, IntentMandate>,
    payment_mandates: HashMap<PaymentMandateId, PaymentMandate>,
}

/// The AgentPay mandate engine
///
/// Signing of a given mandate is serialized by the store's write lock,
/// so concurrent merchant/user signing cannot interleave.
pub struct MandateEngine {
    signer: MandateSigner,
    state: Arc<RwLock<EngineState>>,
}

impl MandateEngine {
    /// Create an engine signing with the given keyed-hash signer
    pub fn new(signer: MandateSigner) -> Self {
        Self {
            signer,
            state: Arc::new(RwLock::new(EngineState::default())),
        }
    }

    /// Create a cart mandate from line items
    ///
    /// The total is computed from item subtotals; the invariant
    /// `total == sum(unit_price * quantity)` holds by construction.
    pub async fn create_cart_mandate(
        &self,
        user_id: UserId,
        items: Vec<CartItemInput>,
        currency: Currency,
        ttl: Duration,
    ) -> Result<CartMandate> {
        if items.is_empty() {
            return Err(AgentPayError::validation("items", "cart must not be empty"));
        }

        let mut line_items = Vec::with_capacity(items.len());
        let mut total = Amount::zero(currency);
        for item in items {
            if item.unit_price.is_negative() {
                return Err(AgentPayError::validation(
                    "unit_price",
                    format!("negative price for {}", item.name),
                ));
            }
            if item.quantity == 0 {
                return Err(AgentPayError::validation(
                    "quantity",
                    format!("zero quantity for {}", item.name),
                ));
            }
            if item.unit_price.currency != currency {
                return Err(AgentPayError::validation(
                    "currency",
                    format!(
                        "item {} priced in {}, mandate currency is {}",
                        item.name, item.unit_price.currency, currency
                    ),
                ));
            }

            let subtotal = item.unit_price.checked_mul(item.quantity)?;
            total = total.checked_add(subtotal)?;
            line_items.push(LineItem {
                product_id: item.product_id,
                name: item.name,
                unit_price: item.unit_price,
                quantity: item.quantity,
                subtotal,
            });
        }

        let now = Utc::now();
        let mandate = CartMandate {
            id: MandateId::new(),
            user_id,
            items: line_items,
            total,
            currency,
            payer: None,
            payee: None,
            risk_data: None,
            shipping_address: None,
            payment_token: None,
            created_at: now,
            expires_at: Some(now + ttl),
            status: MandateStatus::Pending,
            merchant_signature: None,
            user_signature: None,
        };

        let mut state = self.state.write().await;
        state.cart_mandates.insert(mandate.id.clone(), mandate.clone());
        info!(
            "Cart mandate created: {} for {} ({})",
            mandate.id, mandate.user_id, mandate.total
        );
        Ok(mandate)
    }

    /// Fill the merchant signature slot
    ///
    /// Draws a fresh nonce every call, so repeated invocations produce
    /// distinct (both valid) signatures - callers must not re-invoke
    /// after success.
    pub async fn merchant_sign(
        &self,
        mandate_id: &MandateId,
        merchant_id: &MerchantId,
        merchant_name: &str,
    ) -> Result<CartMandate> {
        let mut state = self.state.write().await;
        let mandate = state
            .cart_mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;

        let nonce = generate_nonce();
        let signed_at = Utc::now();
        let payload = MerchantSignPayload {
            mandate_id: mandate.id.to_string(),
            merchant_id: merchant_id.to_string(),
            total_minor: mandate.total.minor,
            currency: mandate.currency.code(),
            item_count: mandate.items.len(),
            timestamp: signed_at.to_rfc3339(),
            nonce: &nonce,
            role: "merchant",
        };
        let signature = self.signer.sign(&payload)?;

        mandate.payee = Some(PartyRef {
            id: merchant_id.to_string(),
            name: merchant_name.to_string(),
        });
        mandate.merchant_signature = Some(SignatureSlot {
            signature,
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            nonce,
            signed_at,
        });

        info!("Mandate {} merchant-signed by {}", mandate.id, merchant_id);
        Ok(mandate.clone())
    }

    /// Fill the user signature slot
    ///
    /// Fails with a precondition error while the merchant slot is empty
    /// and with an authorization error when the signer does not own the
    /// mandate. The payload chains the merchant signature.
    pub async fn user_sign(&self, mandate_id: &MandateId, user_id: &UserId) -> Result<CartMandate> {
        let mut state = self.state.write().await;
        let mandate = state
            .cart_mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;

        if mandate.is_expired() {
            return Err(AgentPayError::Expired {
                entity: "Mandate",
                id: mandate_id.to_string(),
            });
        }

        let merchant_signature = match &mandate.merchant_signature {
            Some(slot) => slot.signature.clone(),
            None => {
                return Err(AgentPayError::precondition(
                    "user_sign",
                    "merchant signature slot is empty",
                ))
            }
        };

        if &mandate.user_id != user_id {
            warn!(
                "User signing rejected: {} does not own mandate {}",
                user_id, mandate_id
            );
            return Err(AgentPayError::unauthorized(format!(
                "user {} does not own mandate {}",
                user_id, mandate_id
            )));
        }

        let nonce = generate_nonce();
        let signed_at = Utc::now();
        let payload = UserSignPayload {
            mandate_id: mandate.id.to_string(),
            user_id: user_id.to_string(),
            total_minor: mandate.total.minor,
            currency: mandate.currency.code(),
            merchant_signature: &merchant_signature,
            timestamp: signed_at.to_rfc3339(),
            nonce: &nonce,
            role: "user",
        };
        let signature = self.signer.sign(&payload)?;

        mandate.user_signature = Some(SignatureSlot {
            signature,
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            nonce,
            signed_at,
        });
        mandate.status = MandateStatus::PendingChallenge;

        info!("Mandate {} user-signed by {}", mandate.id, user_id);
        Ok(mandate.clone())
    }

    /// Create an intent mandate for unattended purchases
    ///
    /// No two-phase flow: the user authorization is signed once at
    /// creation (hardware-backed in a production system).
    pub async fn create_intent_mandate(
        &self,
        user_id: UserId,
        budget: Amount,
        allowed_categories: Vec<String>,
        allowed_skus: Vec<ProductId>,
        chargeable_methods: Vec<CredentialId>,
        ttl: Duration,
    ) -> Result<IntentMandate> {
        if !budget.is_positive() {
            return Err(AgentPayError::validation(
                "budget",
                "budget ceiling must be positive",
            ));
        }
        if chargeable_methods.is_empty() {
            return Err(AgentPayError::validation(
                "chargeable_methods",
                "at least one chargeable payment method is required",
            ));
        }

        let now = Utc::now();
        let id = MandateId::new();
        let expires_at = now + ttl;

        let nonce = generate_nonce();
        let payload = IntentSignPayload {
            mandate_id: id.to_string(),
            user_id: user_id.to_string(),
            budget_minor: budget.minor,
            currency: budget.currency.code(),
            expires_at: expires_at.to_rfc3339(),
            nonce: &nonce,
            role: "user",
        };
        let signature = self.signer.sign(&payload)?;

        let mandate = IntentMandate {
            id,
            user_id,
            budget,
            allowed_categories,
            allowed_skus,
            chargeable_methods,
            created_at: now,
            expires_at,
            status: MandateStatus::Pending,
            user_signature: Some(SignatureSlot {
                signature,
                algorithm: SIGNATURE_ALGORITHM.to_string(),
                nonce,
                signed_at: now,
            }),
        };

        let mut state = self.state.write().await;
        state
            .intent_mandates
            .insert(mandate.id.clone(), mandate.clone());
        info!(
            "Intent mandate created: {} budget {} until {}",
            mandate.id, mandate.budget, mandate.expires_at
        );
        Ok(mandate)
    }

    /// Derive a payment mandate from a fully signed cart mandate
    pub async fn derive_payment_mandate(
        &self,
        mandate_id: &MandateId,
        method_name: &str,
        token: Option<TokenId>,
    ) -> Result<PaymentMandate> {
        let mut state = self.state.write().await;
        let mandate = state
            .cart_mandates
            .get(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;

        let user_authorization = match (&mandate.merchant_signature, &mandate.user_signature) {
            (Some(_), Some(user_slot)) => user_slot.signature.clone(),
            _ => {
                return Err(AgentPayError::precondition(
                    "derive_payment_mandate",
                    "mandate is not fully signed",
                ))
            }
        };

        let payment_mandate = PaymentMandate {
            id: PaymentMandateId::new(),
            source_mandate_id: mandate.id.clone(),
            agent_present: true,
            transaction_modality: TransactionModality::HumanPresent,
            contents: PaymentMandateContents {
                payment_details_id: format!("cart_{}", mandate.id),
                total: mandate.total,
                payment_response: PaymentResponse {
                    method_name: method_name.to_string(),
                    token,
                    shipping_address: mandate.shipping_address.clone(),
                    payer_name: mandate.payer.as_ref().map(|p| p.name.clone()),
                },
                merchant_agent: mandate
                    .payee
                    .as_ref()
                    .map(|p| p.id.clone())
                    .unwrap_or_else(|| "merchant_agent".to_string()),
            },
            user_authorization,
            created_at: Utc::now(),
        };

        state
            .payment_mandates
            .insert(payment_mandate.id.clone(), payment_mandate.clone());
        info!(
            "Payment mandate {} derived from {}",
            payment_mandate.id, mandate_id
        );
        Ok(payment_mandate)
    }

    /// Derive a payment mandate from an intent mandate (unattended path)
    ///
    /// Enforces the budget ceiling, the chargeable-method list, and the
    /// category/SKU allow-lists when the caller supplies them.
    pub async fn derive_payment_mandate_from_intent(
        &self,
        mandate_id: &MandateId,
        amount: Amount,
        credential_id: &CredentialId,
        method_name: &str,
        token: Option<TokenId>,
        sku: Option<&ProductId>,
        category: Option<&str>,
    ) -> Result<PaymentMandate> {
        let mut state = self.state.write().await;
        let mandate = state
            .intent_mandates
            .get(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;

        let user_authorization = match &mandate.user_signature {
            Some(slot) => slot.signature.clone(),
            None => {
                return Err(AgentPayError::precondition(
                    "derive_payment_mandate_from_intent",
                    "intent mandate carries no user authorization",
                ))
            }
        };
        if mandate.is_expired() {
            return Err(AgentPayError::Expired {
                entity: "Mandate",
                id: mandate_id.to_string(),
            });
        }
        if !mandate.is_within_budget(&amount) {
            return Err(AgentPayError::validation(
                "amount",
                format!("{} exceeds the intent budget of {}", amount, mandate.budget),
            ));
        }
        if !mandate.can_charge(credential_id) {
            return Err(AgentPayError::validation(
                "credential",
                format!("{} is not chargeable under this intent", credential_id),
            ));
        }
        if let Some(sku) = sku {
            if !mandate.allows_sku(sku) {
                return Err(AgentPayError::validation(
                    "sku",
                    format!("{} is outside the intent's SKU allow-list", sku),
                ));
            }
        }
        if let Some(category) = category {
            if !mandate.allows_category(category) {
                return Err(AgentPayError::validation(
                    "category",
                    format!("{category} is outside the intent's category allow-list"),
                ));
            }
        }

        let payment_mandate = PaymentMandate {
            id: PaymentMandateId::new(),
            source_mandate_id: mandate.id.clone(),
            agent_present: true,
            transaction_modality: TransactionModality::HumanNotPresent,
            contents: PaymentMandateContents {
                payment_details_id: format!("intent_{}", mandate.id),
                total: amount,
                payment_response: PaymentResponse {
                    method_name: method_name.to_string(),
                    token,
                    shipping_address: None,
                    payer_name: None,
                },
                merchant_agent: "merchant_agent".to_string(),
            },
            user_authorization,
            created_at: Utc::now(),
        };

        state
            .payment_mandates
            .insert(payment_mandate.id.clone(), payment_mandate.clone());
        info!(
            "Payment mandate {} derived from intent {}",
            payment_mandate.id, mandate_id
        );
        Ok(payment_mandate)
    }

    /// Get a cart mandate by id
    pub async fn get_mandate(&self, mandate_id: &MandateId) -> Option<CartMandate> {
        self.state
            .read()
            .await
            .cart_mandates
            .get(mandate_id)
            .cloned()
    }

    /// Get an intent mandate by id
    pub async fn get_intent_mandate(&self, mandate_id: &MandateId) -> Option<IntentMandate> {
        self.state
            .read()
            .await
            .intent_mandates
            .get(mandate_id)
            .cloned()
    }

    /// Mandate exists, is not expired and is still awaiting settlement
    pub async fn is_valid(&self, mandate_id: &MandateId) -> bool {
        let state = self.state.read().await;
        match state.cart_mandates.get(mandate_id) {
            Some(mandate) => {
                !mandate.is_expired()
                    && matches!(
                        mandate.status,
                        MandateStatus::Pending | MandateStatus::PendingChallenge
                    )
            }
            None => match state.intent_mandates.get(mandate_id) {
                Some(intent) => !intent.is_expired() && intent.status == MandateStatus::Pending,
                None => false,
            },
        }
    }

    /// Valid AND fully signed - the settlement gate
    pub async fn is_settlement_ready(&self, mandate_id: &MandateId) -> bool {
        if !self.is_valid(mandate_id).await {
            return false;
        }
        let state = self.state.read().await;
        state
            .cart_mandates
            .get(mandate_id)
            .map(|m| m.is_fully_signed())
            .unwrap_or(false)
    }

    /// Full mandate detail for the host layer
    pub async fn mandate_detail(&self, mandate_id: &MandateId) -> Result<serde_json::Value> {
        let mandate = self
            .get_mandate(mandate_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;
        let valid = self.is_valid(mandate_id).await;

        Ok(serde_json::json!({
            "mandate": {
                "id": mandate.id.to_string(),
                "type": "cart_mandate",
                "user_id": mandate.user_id.to_string(),
                "total": { "currency": mandate.currency.code(), "amount": mandate.total.to_major() },
                "status": mandate.status.as_str(),
                "created_at": mandate.created_at.to_rfc3339(),
                "expires_at": mandate.expires_at.map(|t| t.to_rfc3339()),
                "payee": mandate.payee.as_ref().map(|p| serde_json::json!({ "id": p.id, "name": p.name })),
                "items": mandate.items.iter().map(|item| serde_json::json!({
                    "product_id": item.product_id.to_string(),
                    "name": item.name,
                    "unit_price": item.unit_price.to_major(),
                    "quantity": item.quantity,
                    "subtotal": item.subtotal.to_major(),
                })).collect::<Vec<_>>(),
            },
            "signatures": {
                "merchant_signed": mandate.merchant_signature.is_some(),
                "user_signed": mandate.user_signature.is_some(),
                "fully_signed": mandate.is_fully_signed(),
                "awaiting": if mandate.merchant_signature.is_none() {
                    Some("merchant_signature")
                } else if mandate.user_signature.is_none() {
                    Some("user_signature")
                } else {
                    None
                },
            },
            "valid": valid,
        }))
    }

    /// All of a user's valid cart mandates
    pub async fn user_mandates(&self, user_id: &UserId) -> Vec<CartMandate> {
        let state = self.state.read().await;
        state
            .cart_mandates
            .values()
            .filter(|m| {
                &m.user_id == user_id
                    && !m.is_expired()
                    && matches!(
                        m.status,
                        MandateStatus::Pending | MandateStatus::PendingChallenge
                    )
            })
            .cloned()
            .collect()
    }

    /// Update a cart mandate's lifecycle status; false when not found
    pub async fn set_status(&self, mandate_id: &MandateId, status: MandateStatus) -> bool {
        let mut state = self.state.write().await;
        match state.cart_mandates.get_mut(mandate_id) {
            Some(mandate) => {
                mandate.status = status;
                true
            }
            None => false,
        }
    }

    /// Bind an issued payment token to a cart mandate
    pub async fn bind_token(&self, mandate_id: &MandateId, token_id: TokenId) -> Result<()> {
        let mut state = self.state.write().await;
        let mandate = state
            .cart_mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Mandate", mandate_id.to_string()))?;
        mandate.payment_token = Some(token_id);
        Ok(())
    }

    /// Drop expired mandates; returns the number removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.cart_mandates.len() + state.intent_mandates.len();
        state.cart_mandates.retain(|_, m| !m.is_expired());
        state.intent_mandates.retain(|_, m| !m.is_expired());
        let removed = before - state.cart_mandates.len() - state.intent_mandates.len();
        if removed > 0 {
            info!("Cleaned up {} expired mandates", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MandateEngine {
        MandateEngine::new(MandateSigner::new(b"test_mandate_secret"))
    }

    fn items(prices: &[(f64, u32)]) -> Vec<CartItemInput> {
        prices
            .iter()
            .map(|(price, quantity)| CartItemInput {
                product_id: ProductId::new(),
                name: format!("Product at {price}"),
                unit_price: Amount::from_major(*price, Currency::USD),
                quantity: *quantity,
            })
            .collect()
    }

    async fn signed_mandate(engine: &MandateEngine, user: &UserId) -> CartMandate {
        let mandate = engine
            .create_cart_mandate(
                user.clone(),
                items(&[(999.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();
        engine
            .merchant_sign(&mandate.id, &MerchantId::new(), "Test Store")
            .await
            .unwrap();
        engine.user_sign(&mandate.id, user).await.unwrap()
    }

    #[tokio::test]
    async fn test_total_is_sum_of_subtotals() {
        let engine = engine();
        let mandate = engine
            .create_cart_mandate(
                UserId::new(),
                items(&[(99.99, 2), (10.0, 3)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        assert_eq!(mandate.total.minor, 19998 + 3000);
        assert_eq!(mandate.computed_total().unwrap(), mandate.total);
        assert_eq!(mandate.status, MandateStatus::Pending);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let engine = engine();
        let result = engine
            .create_cart_mandate(UserId::new(), vec![], Currency::USD, Duration::minutes(30))
            .await;
        assert!(matches!(result, Err(AgentPayError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let engine = engine();
        let result = engine
            .create_cart_mandate(
                UserId::new(),
                items(&[(-1.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await;
        assert!(matches!(result, Err(AgentPayError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_user_sign_requires_merchant_first() {
        let engine = engine();
        let user = UserId::new();
        let mandate = engine
            .create_cart_mandate(
                user.clone(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        let result = engine.user_sign(&mandate.id, &user).await;
        assert!(matches!(result, Err(AgentPayError::Precondition { .. })));

        engine
            .merchant_sign(&mandate.id, &MerchantId::new(), "Store")
            .await
            .unwrap();
        let signed = engine.user_sign(&mandate.id, &user).await.unwrap();
        assert!(signed.is_fully_signed());
        assert_eq!(signed.status, MandateStatus::PendingChallenge);
    }

    #[tokio::test]
    async fn test_user_sign_rejects_wrong_user() {
        let engine = engine();
        let owner = UserId::new();
        let mandate = engine
            .create_cart_mandate(
                owner.clone(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();
        engine
            .merchant_sign(&mandate.id, &MerchantId::new(), "Store")
            .await
            .unwrap();

        let result = engine.user_sign(&mandate.id, &UserId::new()).await;
        assert!(matches!(result, Err(AgentPayError::Authorization { .. })));

        // the owner's slot is still empty after the rejected attempt
        let mandate = engine.get_mandate(&mandate.id).await.unwrap();
        assert!(mandate.user_signature.is_none());
    }

    #[tokio::test]
    async fn test_merchant_sign_not_idempotent() {
        let engine = engine();
        let mandate = engine
            .create_cart_mandate(
                UserId::new(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        let merchant = MerchantId::new();
        let first = engine
            .merchant_sign(&mandate.id, &merchant, "Store")
            .await
            .unwrap();
        let second = engine
            .merchant_sign(&mandate.id, &merchant, "Store")
            .await
            .unwrap();

        let a = first.merchant_signature.unwrap();
        let b = second.merchant_signature.unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.signature, b.signature);
    }

    #[tokio::test]
    async fn test_derive_requires_full_signing() {
        let engine = engine();
        let user = UserId::new();
        let mandate = engine
            .create_cart_mandate(
                user.clone(),
                items(&[(999.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        let result = engine.derive_payment_mandate(&mandate.id, "CARD", None).await;
        assert!(matches!(result, Err(AgentPayError::Precondition { .. })));

        engine
            .merchant_sign(&mandate.id, &MerchantId::new(), "Store")
            .await
            .unwrap();
        let result = engine.derive_payment_mandate(&mandate.id, "CARD", None).await;
        assert!(matches!(result, Err(AgentPayError::Precondition { .. })));

        engine.user_sign(&mandate.id, &user).await.unwrap();
        let payment = engine
            .derive_payment_mandate(&mandate.id, "CARD", None)
            .await
            .unwrap();

        assert!(payment.agent_present);
        assert_eq!(
            payment.transaction_modality,
            TransactionModality::HumanPresent
        );
        assert_eq!(payment.source_mandate_id, mandate.id);
        assert_eq!(payment.contents.total, mandate.total);
    }

    #[tokio::test]
    async fn test_derived_authorization_matches_user_signature() {
        let engine = engine();
        let user = UserId::new();
        let mandate = signed_mandate(&engine, &user).await;

        let payment = engine
            .derive_payment_mandate(&mandate.id, "CARD", None)
            .await
            .unwrap();
        assert_eq!(
            payment.user_authorization,
            mandate.user_signature.unwrap().signature
        );
    }

    #[tokio::test]
    async fn test_intent_mandate_flow() {
        let engine = engine();
        let user = UserId::new();
        let credential = CredentialId::new();

        let intent = engine
            .create_intent_mandate(
                user.clone(),
                Amount::from_major(500.0, Currency::USD),
                vec!["electronics".to_string()],
                vec![],
                vec![credential.clone()],
                Duration::days(7),
            )
            .await
            .unwrap();

        assert!(intent.user_signature.is_some());

        let payment = engine
            .derive_payment_mandate_from_intent(
                &intent.id,
                Amount::from_major(200.0, Currency::USD),
                &credential,
                "CARD",
                None,
                None,
                Some("electronics"),
            )
            .await
            .unwrap();
        assert_eq!(
            payment.transaction_modality,
            TransactionModality::HumanNotPresent
        );

        // budget ceiling enforced
        let over = engine
            .derive_payment_mandate_from_intent(
                &intent.id,
                Amount::from_major(600.0, Currency::USD),
                &credential,
                "CARD",
                None,
                None,
                None,
            )
            .await;
        assert!(matches!(over, Err(AgentPayError::Validation { .. })));

        // non-chargeable credential rejected
        let foreign = engine
            .derive_payment_mandate_from_intent(
                &intent.id,
                Amount::from_major(10.0, Currency::USD),
                &CredentialId::new(),
                "CARD",
                None,
                None,
                None,
            )
            .await;
        assert!(matches!(foreign, Err(AgentPayError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_is_valid_and_settlement_ready() {
        let engine = engine();
        let user = UserId::new();
        let mandate = engine
            .create_cart_mandate(
                user.clone(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        assert!(engine.is_valid(&mandate.id).await);
        assert!(!engine.is_settlement_ready(&mandate.id).await);
        assert!(!engine.is_valid(&MandateId::new()).await);

        engine
            .merchant_sign(&mandate.id, &MerchantId::new(), "Store")
            .await
            .unwrap();
        engine.user_sign(&mandate.id, &user).await.unwrap();
        assert!(engine.is_settlement_ready(&mandate.id).await);

        engine.set_status(&mandate.id, MandateStatus::Completed).await;
        assert!(!engine.is_valid(&mandate.id).await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let engine = engine();
        engine
            .create_cart_mandate(
                UserId::new(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::seconds(-1),
            )
            .await
            .unwrap();
        engine
            .create_cart_mandate(
                UserId::new(),
                items(&[(10.0, 1)]),
                Currency::USD,
                Duration::minutes(30),
            )
            .await
            .unwrap();

        assert_eq!(engine.cleanup_expired().await, 1);
        assert_eq!(engine.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn test_mandate_detail_shape() {
        let engine = engine();
        let user = UserId::new();
        let mandate = signed_mandate(&engine, &user).await;

        let detail = engine.mandate_detail(&mandate.id).await.unwrap();
        assert_eq!(detail["signatures"]["merchant_signed"], true);
        assert_eq!(detail["signatures"]["user_signed"], true);
        assert_eq!(detail["signatures"]["fully_signed"], true);
        assert_eq!(detail["signatures"]["awaiting"], serde_json::Value::Null);
        assert_eq!(detail["mandate"]["total"]["currency"], "USD");
    }
}
