//! Error taxonomy for AgentPay
//!
//! Every expected business failure is an explicit variant; panics are
//! reserved for programmer error. Each variant carries a stable error
//! code so host layers can render consistent guidance.

use thiserror::Error;

/// Result type for AgentPay operations
pub type Result<T> = std::result::Result<T, AgentPayError>;

/// AgentPay error types
#[derive(Debug, Clone, Error)]
pub enum AgentPayError {
    /// Malformed input (empty cart, negative price, unsupported currency)
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Operation invoked out of order
    #[error("Precondition failed for {operation}: {reason}")]
    Precondition { operation: String, reason: String },

    /// Identity mismatch on a protected resource
    #[error("Unauthorized: {reason}")]
    Authorization { reason: String },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Mandate, token or challenge past its expiry window
    #[error("{entity} {id} has expired; request a new one")]
    Expired { entity: &'static str, id: String },

    /// Wrong challenge code; the challenge remains open
    #[error("Incorrect code; {attempts_remaining} attempt(s) remaining")]
    InvalidCode { attempts_remaining: u32 },

    /// Challenge attempt cap reached
    #[error("Maximum verification attempts exceeded for challenge on {mandate_id}; restart payment")]
    AttemptsExceeded { mandate_id: String },

    /// Challenge already in a terminal state
    #[error("Challenge is closed (state: {state}); restart payment to get a new code")]
    ChallengeClosed { state: String },

    /// Token not found, already used, or expired
    #[error("Token {token_id} is invalid: {reason}")]
    TokenInvalid { token_id: String, reason: String },

    /// Unexpected failure (crypto subsystem, storage corruption)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentPayError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an authorization error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same call can ever succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::InvalidCode { .. })
    }

    /// Get a stable error code for host-layer payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Precondition { .. } => "PRECONDITION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Expired { .. } => "EXPIRED",
            Self::InvalidCode { .. } => "INVALID_CODE",
            Self::AttemptsExceeded { .. } => "ATTEMPTS_EXCEEDED",
            Self::ChallengeClosed { .. } => "CHALLENGE_CLOSED",
            Self::TokenInvalid { .. } => "TOKEN_INVALID",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
