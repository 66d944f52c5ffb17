//! AgentPay Crypto - signing, sealing and randomness
//!
//! Three concerns live here:
//!
//! 1. [`MandateSigner`] - deterministic keyed-hash signatures over
//!    canonical payloads (HMAC-SHA256)
//! 2. [`CredentialCipher`] - AES-256-GCM sealing of credential data
//! 3. Random generation of token values, OTP codes and signing nonces,
//!    all from the OS CSPRNG - never derived from ids or timestamps

pub mod cipher;
pub mod random;
pub mod signer;

pub use cipher::CredentialCipher;
pub use random::{generate_nonce, generate_otp, generate_token_value};
pub use signer::MandateSigner;
