//! AgentPay Types - Canonical domain types for agent payment authorization
//!
//! This crate contains all foundational types for AgentPay with zero
//! dependencies on other agentpay crates. It defines the complete type
//! system for:
//!
//! - Identity types (UserId, MandateId, CredentialId, etc.)
//! - Currency and minor-unit amount types
//! - Cart, intent and payment mandates with their signature slots
//! - Payment credentials, tokens and OTP challenges
//! - Transactions and refunds
//!
//! # Protocol Invariants
//!
//! These types support the core AgentPay authorization invariants:
//!
//! 1. A mandate's user signature slot stays empty until the merchant
//!    slot is filled
//! 2. A payment mandate can only be derived from a fully signed mandate
//! 3. At most one credential per user carries the default flag
//! 4. A consumed token is permanently invalid
//! 5. A challenge's attempt counter never goes below zero

pub mod identity;
pub mod currency;
pub mod amount;
pub mod mandate;
pub mod credential;
pub mod token;
pub mod challenge;
pub mod transaction;
pub mod error;

pub use identity::*;
pub use currency::*;
pub use amount::*;
pub use mandate::*;
pub use credential::*;
pub use token::*;
pub use challenge::*;
pub use transaction::*;
pub use error::*;

/// Version of the AgentPay types schema
pub const TYPES_VERSION: &str = "0.1.0";
