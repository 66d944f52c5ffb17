//! Transaction and refund types for AgentPay

use crate::{Amount, CredentialId, MandateId, RefundId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A completed-payment record, created only after OTP verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub mandate_id: MandateId,
    pub user_id: UserId,
    pub amount: Amount,
    pub method_ref: CredentialId,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Transaction {
    /// Mark the transaction as settled
    pub fn mark_completed(&mut self) {
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the transaction as failed with a reason
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TransactionStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Refund lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Processing,
    Completed,
}

/// A refund against a completed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: RefundId,
    pub transaction_id: TransactionId,
    /// Clamped to the original transaction amount
    pub amount: Amount,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub estimated_arrival: String,
}
