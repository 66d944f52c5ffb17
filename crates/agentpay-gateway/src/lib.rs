//! AgentPay Gateway - the composition root
//!
//! Constructs the service instances (credential store, mandate engine,
//! token issuer, ledger, challenge controller) explicitly and wires them
//! into a single façade the host layer calls. One gateway per process;
//! no module-level singletons.
//!
//! The host layer (conversational UI, webhook handler) serializes the
//! payload shapes exposed here; the gateway never does wire framing.

pub mod config;
pub mod gateway;
pub mod payloads;

pub use config::GatewayConfig;
pub use gateway::{CleanupReport, PaymentsGateway};
pub use payloads::{
    error_payload, PaymentInitiationResult, PaymentMethodSummary, TokenIssuanceResult,
};
