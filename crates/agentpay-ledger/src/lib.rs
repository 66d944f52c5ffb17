//! AgentPay Transaction Ledger
//!
//! Records completed transactions keyed by mandate, derived from
//! successful challenge completion, plus refunds against them.
//!
//! Settlement is a two-step transition (Processing -> Completed) kept
//! explicit so a real payment rail can insert a pending intermediate
//! state and a retry/timeout policy without reshaping the types.

use std::collections::HashMap;
use std::sync::Arc;

use agentpay_types::{
    AgentPayError, Amount, CredentialId, MandateId, RefundId, RefundRequest, RefundStatus,
    Result, Transaction, TransactionId, TransactionStatus, UserId,
};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

/// Host-visible refund arrival estimate
const REFUND_ARRIVAL: &str = "3-5 business days";

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<TransactionId, Transaction>,
    refunds: HashMap<RefundId, RefundRequest>,
}

/// The AgentPay transaction ledger
pub struct TransactionLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl TransactionLedger {
    /// Create a new in-memory ledger
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }

    /// Record a settled payment
    ///
    /// The transaction is created Processing and then marked Completed;
    /// there is no asynchronous settlement path in this design.
    pub async fn record(
        &self,
        mandate_id: MandateId,
        user_id: UserId,
        amount: Amount,
        method_ref: CredentialId,
    ) -> Result<Transaction> {
        let mut transaction = Transaction {
            id: TransactionId::new(),
            mandate_id,
            user_id,
            amount,
            method_ref,
            status: TransactionStatus::Processing,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        transaction.mark_completed();

        let mut state = self.state.write().await;
        state
            .transactions
            .insert(transaction.id.clone(), transaction.clone());

        info!(
            "Transaction recorded: {} for mandate {} ({})",
            transaction.id, transaction.mandate_id, transaction.amount
        );
        Ok(transaction)
    }

    /// Get a transaction by id
    pub async fn get_transaction(&self, transaction_id: &TransactionId) -> Option<Transaction> {
        self.state
            .read()
            .await
            .transactions
            .get(transaction_id)
            .cloned()
    }

    /// Detailed status payload for the host layer
    pub async fn status_payload(&self, transaction_id: &TransactionId) -> Result<serde_json::Value> {
        let transaction = self
            .get_transaction(transaction_id)
            .await
            .ok_or_else(|| AgentPayError::not_found("Transaction", transaction_id.to_string()))?;

        Ok(serde_json::json!({
            "transaction_id": transaction.id.to_string(),
            "mandate_id": transaction.mandate_id.to_string(),
            "status": transaction.status.as_str(),
            "amount": transaction.amount.to_major(),
            "currency": transaction.amount.currency.code(),
            "created_at": transaction.created_at.to_rfc3339(),
            "completed_at": transaction.completed_at.map(|t| t.to_rfc3339()),
            "payment_method_ref": transaction.method_ref.to_string(),
            "error_message": transaction.error_message,
        }))
    }

    /// Refund a completed transaction
    ///
    /// Only completed transactions can be refunded; the refund amount is
    /// clamped to the transaction amount.
    pub async fn process_refund(
        &self,
        transaction_id: &TransactionId,
        amount: Amount,
        reason: impl Into<String>,
    ) -> Result<RefundRequest> {
        let mut state = self.state.write().await;
        let transaction = state
            .transactions
            .get(transaction_id)
            .ok_or_else(|| AgentPayError::not_found("Transaction", transaction_id.to_string()))?;

        if transaction.status != TransactionStatus::Completed {
            return Err(AgentPayError::precondition(
                "process_refund",
                "only completed transactions can be refunded",
            ));
        }
        if amount.currency != transaction.amount.currency {
            return Err(AgentPayError::validation(
                "currency",
                format!(
                    "refund in {}, transaction in {}",
                    amount.currency, transaction.amount.currency
                ),
            ));
        }
        if !amount.is_positive() {
            return Err(AgentPayError::validation(
                "amount",
                "refund amount must be positive",
            ));
        }

        let mut refund = RefundRequest {
            id: RefundId::new(),
            transaction_id: transaction_id.clone(),
            amount: amount.min(transaction.amount),
            reason: reason.into(),
            status: RefundStatus::Processing,
            created_at: Utc::now(),
            processed_at: None,
            estimated_arrival: REFUND_ARRIVAL.to_string(),
        };
        refund.status = RefundStatus::Completed;
        refund.processed_at = Some(Utc::now());

        state.refunds.insert(refund.id.clone(), refund.clone());
        info!(
            "Refund processed: {} for transaction {} ({})",
            refund.id, transaction_id, refund.amount
        );
        Ok(refund)
    }

    /// Get a refund by id
    pub async fn get_refund(&self, refund_id: &RefundId) -> Option<RefundRequest> {
        self.state.read().await.refunds.get(refund_id).cloned()
    }

    /// All transactions for a user, newest first
    pub async fn user_transactions(&self, user_id: &UserId) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transactions
    }

    /// Number of recorded transactions
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}
