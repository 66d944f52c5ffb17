//! AgentPay Credential Store
//!
//! Holds per-user payment credentials with encryption-at-rest for the
//! instrument data, default/priority ordering, and per-credential
//! transaction-limit policy.
//!
//! # Invariants
//!
//! 1. At most one credential per user carries the default flag; setting
//!    a new default clears all prior defaults in the same write section
//! 2. Instrument data is stored only as ciphertext
//! 3. Eligibility queries observe a consistent snapshot - never a
//!    half-updated default set

use std::collections::HashMap;
use std::sync::Arc;

use agentpay_crypto::CredentialCipher;
use agentpay_types::{
    AgentPayError, Amount, CredentialId, CredentialStatus, Currency, PaymentCredential,
    PaymentMethodType, Result, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// Registration request for a new credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCredential {
    pub user_id: UserId,
    pub method_type: PaymentMethodType,
    /// Sensitive instrument data; encrypted before storage
    pub sensitive_data: serde_json::Value,
    pub brand: String,
    pub is_default: bool,
    pub nickname: Option<String>,
    /// Used for non-card instruments, where no card number is available
    pub last_four: Option<String>,
    pub supported_currencies: Option<Vec<Currency>>,
    pub max_transaction_amount: Option<Amount>,
    pub min_transaction_amount: Option<Amount>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StoreState {
    credentials: HashMap<CredentialId, PaymentCredential>,
    /// Per-user credential ids in registration order
    user_index: HashMap<UserId, Vec<CredentialId>>,
}

/// The AgentPay credential store
///
/// All state lives behind a single lock so default-flag updates and
/// registration for the same user are serialized, and reads see a
/// consistent snapshot.
pub struct CredentialStore {
    cipher: CredentialCipher,
    state: Arc<RwLock<StoreState>>,
}

impl CredentialStore {
    /// Create a store sealing instrument data with the given cipher
    pub fn new(cipher: CredentialCipher) -> Self {
        Self {
            cipher,
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Register a new payment credential for a user
    ///
    /// Encrypts the instrument data, derives the display last-four, and
    /// atomically clears other defaults when `is_default` is set.
    /// Priority defaults to the user's current credential count, so
    /// earlier registrations rank higher.
    pub async fn register_credential(
        &self,
        request: RegisterCredential,
    ) -> Result<PaymentCredential> {
        let last_four = derive_last_four(&request);

        let plaintext = serde_json::to_vec(&request.sensitive_data)
            .map_err(|e| AgentPayError::internal(format!("credential data serialization: {e}")))?;
        let encrypted_data = self.cipher.encrypt(&plaintext)?;

        let mut state = self.state.write().await;

        if request.is_default {
            clear_defaults(&mut state, &request.user_id);
        }

        let priority = state
            .user_index
            .get(&request.user_id)
            .map(|ids| ids.len() as u32)
            .unwrap_or(0);

        let credential = PaymentCredential {
            id: CredentialId::new(),
            user_id: request.user_id.clone(),
            method_type: request.method_type,
            brand: request.brand,
            last_four,
            nickname: request.nickname,
            encrypted_data,
            is_default: request.is_default,
            priority,
            supported_currencies: request
                .supported_currencies
                .unwrap_or_else(|| vec![Currency::USD, Currency::TWD]),
            max_transaction_amount: request.max_transaction_amount,
            min_transaction_amount: request.min_transaction_amount,
            status: CredentialStatus::Active,
            created_at: Utc::now(),
            expires_at: request.expires_at,
        };

        state
            .user_index
            .entry(request.user_id.clone())
            .or_default()
            .push(credential.id.clone());
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());

        info!(
            "Credential registered: {} for user {}",
            credential.id, credential.user_id
        );
        Ok(credential)
    }

    /// Get a credential by id
    pub async fn get_credential(&self, credential_id: &CredentialId) -> Option<PaymentCredential> {
        self.state
            .read()
            .await
            .credentials
            .get(credential_id)
            .cloned()
    }

    /// Get all credentials for a user in registration order
    pub async fn user_credentials(&self, user_id: &UserId) -> Vec<PaymentCredential> {
        let state = self.state.read().await;
        state
            .user_index
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.credentials.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Credentials that can carry the given transaction
    ///
    /// Filters by validity, currency support, amount bounds and an
    /// optional type allow-list. Sorted default-first, then descending
    /// priority. An empty result is not an error.
    pub async fn eligible_methods(
        &self,
        user_id: &UserId,
        amount: &Amount,
        accepted_types: Option<&[PaymentMethodType]>,
    ) -> Vec<PaymentCredential> {
        let state = self.state.read().await;
        let mut eligible: Vec<PaymentCredential> = state
            .user_index
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.credentials.get(id))
                    .filter(|cred| cred.supports_transaction(amount).is_ok())
                    .filter(|cred| {
                        accepted_types
                            .map(|types| types.contains(&cred.method_type))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        eligible.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.priority.cmp(&a.priority))
        });
        eligible
    }

    /// Pick the best credential for a transaction
    ///
    /// A brand hint wins when it matches (case-insensitive) an eligible
    /// credential; otherwise the first in default/priority order.
    pub async fn select_optimal(
        &self,
        user_id: &UserId,
        amount: &Amount,
        accepted_types: Option<&[PaymentMethodType]>,
        brand_hint: Option<&str>,
    ) -> Option<PaymentCredential> {
        let eligible = self.eligible_methods(user_id, amount, accepted_types).await;

        if let Some(hint) = brand_hint {
            if let Some(hit) = eligible
                .iter()
                .find(|cred| cred.brand.eq_ignore_ascii_case(hint))
            {
                return Some(hit.clone());
            }
        }
        eligible.into_iter().next()
    }

    /// Make a credential the user's default
    ///
    /// Returns false when the credential does not exist or belongs to a
    /// different user. Clearing old defaults and setting the new one
    /// happens under one write guard.
    pub async fn set_default(&self, user_id: &UserId, credential_id: &CredentialId) -> bool {
        let mut state = self.state.write().await;

        match state.credentials.get(credential_id) {
            Some(cred) if &cred.user_id == user_id => {}
            _ => return false,
        }

        clear_defaults(&mut state, user_id);
        if let Some(cred) = state.credentials.get_mut(credential_id) {
            cred.is_default = true;
        }
        true
    }

    /// Suspend a credential; false when not found
    pub async fn deactivate(&self, credential_id: &CredentialId) -> bool {
        let mut state = self.state.write().await;
        match state.credentials.get_mut(credential_id) {
            Some(cred) => {
                cred.status = CredentialStatus::Suspended;
                info!("Credential deactivated: {}", credential_id);
                true
            }
            None => false,
        }
    }

    /// Open a credential's sealed instrument data
    ///
    /// Only the settlement path should call this; the result must never
    /// be logged.
    pub async fn decrypt_credential_data(
        &self,
        credential_id: &CredentialId,
    ) -> Result<serde_json::Value> {
        let state = self.state.read().await;
        let credential = state
            .credentials
            .get(credential_id)
            .ok_or_else(|| AgentPayError::not_found("Credential", credential_id.to_string()))?;

        let plaintext = self.cipher.decrypt(&credential.encrypted_data)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| AgentPayError::internal(format!("credential data corrupted: {e}")))
    }

    /// Seed the demo Visa/Mastercard pair for each given user
    pub async fn seed_demo_credentials(&self, users: &[UserId]) -> Result<()> {
        for user_id in users {
            self.register_credential(RegisterCredential {
                user_id: user_id.clone(),
                method_type: PaymentMethodType::Card,
                sensitive_data: serde_json::json!({
                    "card_number": "4111111111111234",
                    "exp_month": 12,
                    "exp_year": 2027,
                    "cvv": "123",
                }),
                brand: "Visa".to_string(),
                is_default: true,
                nickname: Some("My Visa Card".to_string()),
                last_four: None,
                supported_currencies: None,
                max_transaction_amount: None,
                min_transaction_amount: None,
                expires_at: None,
            })
            .await?;

            self.register_credential(RegisterCredential {
                user_id: user_id.clone(),
                method_type: PaymentMethodType::Card,
                sensitive_data: serde_json::json!({
                    "card_number": "5555555555555678",
                    "exp_month": 8,
                    "exp_year": 2026,
                    "cvv": "456",
                }),
                brand: "Mastercard".to_string(),
                is_default: false,
                nickname: Some("My Mastercard".to_string()),
                last_four: None,
                supported_currencies: None,
                max_transaction_amount: None,
                min_transaction_amount: None,
                expires_at: None,
            })
            .await?;
        }
        Ok(())
    }
}

fn derive_last_four(request: &RegisterCredential) -> String {
    if request.method_type == PaymentMethodType::Card {
        let number = request
            .sensitive_data
            .get("card_number")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if number.len() >= 4 {
            return number[number.len() - 4..].to_string();
        }
    }
    request
        .last_four
        .clone()
        .unwrap_or_else(|| "****".to_string())
}

fn clear_defaults(state: &mut StoreState, user_id: &UserId) {
    if let Some(ids) = state.user_index.get(user_id) {
        for id in ids.clone() {
            if let Some(cred) = state.credentials.get_mut(&id) {
                cred.is_default = false;
            }
        }
    }
}
