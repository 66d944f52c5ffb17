//! Mandate types for AgentPay
//!
//! A mandate is a signed, time-bounded authorization object. Cart
//! mandates cover a concrete itemized cart and require merchant-then-user
//! two-phase signing; intent mandates cover standing, unattended
//! authorizations with budget and category constraints. A payment mandate
//! is derived from a fully signed source mandate and carries the
//! network-visible transaction metadata.

use crate::{
    Amount, CredentialId, Currency, MandateId, PaymentMandateId, ProductId, TokenId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a mandate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    /// Created, awaiting signatures or challenge
    Pending,
    /// Fully signed, awaiting OTP verification
    PendingChallenge,
    /// Settled
    Completed,
    /// Settlement failed
    Failed,
    /// Past its expiry window
    Expired,
    /// Cancelled by the user or merchant
    Cancelled,
}

impl MandateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingChallenge => "pending_challenge",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One line of a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Amount,
    pub quantity: u32,
    pub subtotal: Amount,
}

/// A named party referenced by a mandate (payer or payee)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRef {
    pub id: String,
    pub name: String,
}

/// A filled signature slot on a mandate
///
/// Merchant and user slots are independent; each records its own
/// nonce and timestamp so the signing order is auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSlot {
    /// Hex-encoded keyed-hash signature
    pub signature: String,
    /// Signature algorithm tag
    pub algorithm: String,
    /// Per-signature random nonce
    pub nonce: String,
    /// When the slot was filled
    pub signed_at: DateTime<Utc>,
}

/// A cart mandate: authorization over a concrete, itemized cart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartMandate {
    pub id: MandateId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total: Amount,
    pub currency: Currency,
    pub payer: Option<PartyRef>,
    pub payee: Option<PartyRef>,
    /// Opaque risk-signal payload supplied by the host layer
    pub risk_data: Option<serde_json::Value>,
    pub shipping_address: Option<String>,
    /// Token bound to this mandate once payment is initiated
    pub payment_token: Option<TokenId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: MandateStatus,
    pub merchant_signature: Option<SignatureSlot>,
    pub user_signature: Option<SignatureSlot>,
}

impl CartMandate {
    /// Check if the mandate is past its expiry window
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// Both signature slots are filled
    pub fn is_fully_signed(&self) -> bool {
        self.merchant_signature.is_some() && self.user_signature.is_some()
    }

    /// Recompute the total from line-item subtotals
    pub fn computed_total(&self) -> crate::Result<Amount> {
        let mut total = Amount::zero(self.currency);
        for item in &self.items {
            total = total.checked_add(item.subtotal)?;
        }
        Ok(total)
    }
}

/// An intent mandate: standing authorization for unattended purchases
///
/// Carries a budget ceiling, allow-lists for categories and SKUs, the
/// credentials that may be charged, and a hard TTL. Signed once by the
/// user at creation (hardware-backed in a production system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMandate {
    pub id: MandateId,
    pub user_id: UserId,
    pub budget: Amount,
    pub allowed_categories: Vec<String>,
    pub allowed_skus: Vec<ProductId>,
    pub chargeable_methods: Vec<CredentialId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: MandateStatus,
    pub user_signature: Option<SignatureSlot>,
}

impl IntentMandate {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check a purchase amount against the budget ceiling
    pub fn is_within_budget(&self, amount: &Amount) -> bool {
        amount.currency == self.budget.currency && amount.minor <= self.budget.minor
    }

    /// Empty allow-list means any category
    pub fn allows_category(&self, category: &str) -> bool {
        self.allowed_categories.is_empty()
            || self
                .allowed_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category))
    }

    /// Empty allow-list means any SKU
    pub fn allows_sku(&self, sku: &ProductId) -> bool {
        self.allowed_skus.is_empty() || self.allowed_skus.contains(sku)
    }

    pub fn can_charge(&self, credential: &CredentialId) -> bool {
        self.chargeable_methods.contains(credential)
    }
}

/// Whether a human was interactively present during authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionModality {
    HumanPresent,
    HumanNotPresent,
}

impl TransactionModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HumanPresent => "human_present",
            Self::HumanNotPresent => "human_not_present",
        }
    }
}

/// Display fields handed to the payment network alongside the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Method name as shown to the network (e.g. "CARD")
    pub method_name: String,
    pub token: Option<TokenId>,
    pub shipping_address: Option<String>,
    pub payer_name: Option<String>,
}

/// The contents block of a payment mandate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMandateContents {
    /// Reference to the payment details being settled
    pub payment_details_id: String,
    pub total: Amount,
    pub payment_response: PaymentResponse,
    /// The merchant agent acting in this transaction
    pub merchant_agent: String,
}

/// A payment mandate: the derived object submitted for settlement
///
/// Never constructed independently; derived from a mandate whose
/// signature slots are all filled (cart path) or whose single user
/// signature is present (intent path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMandate {
    pub id: PaymentMandateId,
    /// The cart or intent mandate this was derived from
    pub source_mandate_id: MandateId,
    pub agent_present: bool,
    pub transaction_modality: TransactionModality,
    pub contents: PaymentMandateContents,
    /// User authorization signature copied from the source mandate
    pub user_authorization: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentMandate {
    /// Serialize the network-visible payload
    pub fn to_network_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "payment_mandate_id": self.id.to_string(),
            "source_mandate_id": self.source_mandate_id.to_string(),
            "agent_presence": self.agent_present,
            "transaction_modality": self.transaction_modality.as_str(),
            "payment_details_id": self.contents.payment_details_id,
            "total": {
                "currency": self.contents.total.currency.code(),
                "amount": self.contents.total.to_major(),
            },
            "payment_response": {
                "method_name": self.contents.payment_response.method_name,
                "token": self.contents.payment_response.token.as_ref().map(|t| t.to_string()),
                "shipping_address": self.contents.payment_response.shipping_address,
                "payer_name": self.contents.payment_response.payer_name,
            },
            "merchant_agent": self.contents.merchant_agent,
            "user_authorization": self.user_authorization,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}
