//! Gateway configuration
//!
//! Read once at composition time from the environment (a `.env` file is
//! honored via dotenvy). Two values are REQUIRED and startup fails
//! without them:
//!
//! - `AGENTPAY_CREDENTIAL_KEY`: 64 hex chars (32 bytes) for credential
//!   encryption-at-rest. No generated fallback - an ephemeral key would
//!   silently orphan every stored credential on restart.
//! - `AGENTPAY_SIGNING_SECRET`: keyed-hash secret for mandate signing.
//!
//! `AGENTPAY_DEMO_MODE` gates raw-OTP exposure in initiation payloads;
//! it defaults to off and must stay off wherever a real delivery channel
//! exists.

use agentpay_types::{AgentPayError, Result};
use chrono::Duration;

/// Environment variable names
const ENV_CREDENTIAL_KEY: &str = "AGENTPAY_CREDENTIAL_KEY";
const ENV_SIGNING_SECRET: &str = "AGENTPAY_SIGNING_SECRET";
const ENV_DEMO_MODE: &str = "AGENTPAY_DEMO_MODE";
const ENV_MAX_OTP_ATTEMPTS: &str = "AGENTPAY_MAX_OTP_ATTEMPTS";
const ENV_OTP_EXPIRY_MINUTES: &str = "AGENTPAY_OTP_EXPIRY_MINUTES";
const ENV_MANDATE_TTL_MINUTES: &str = "AGENTPAY_MANDATE_TTL_MINUTES";
const ENV_TOKEN_TTL_MINUTES: &str = "AGENTPAY_TOKEN_TTL_MINUTES";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 32-byte credential encryption key, hex encoded
    pub credential_key_hex: String,
    /// Keyed-hash secret for mandate signatures
    pub signing_secret: String,
    /// Expose raw OTP codes in initiation payloads (testing aid only)
    pub demo_mode: bool,
    pub max_otp_attempts: u32,
    pub otp_expiry_minutes: i64,
    pub mandate_ttl_minutes: i64,
    pub token_ttl_minutes: i64,
}

impl GatewayConfig {
    /// Load configuration from the environment, failing fast on missing
    /// or malformed required values
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; real env vars still apply
        let _ = dotenvy::dotenv();

        let credential_key_hex = std::env::var(ENV_CREDENTIAL_KEY).map_err(|_| {
            AgentPayError::validation(
                ENV_CREDENTIAL_KEY,
                "required: 64 hex chars; refusing to generate an ephemeral key",
            )
        })?;
        let key_bytes = hex::decode(&credential_key_hex).map_err(|_| {
            AgentPayError::validation(ENV_CREDENTIAL_KEY, "must be valid hex")
        })?;
        if key_bytes.len() != 32 {
            return Err(AgentPayError::validation(
                ENV_CREDENTIAL_KEY,
                format!("must be 32 bytes, got {}", key_bytes.len()),
            ));
        }

        let signing_secret = std::env::var(ENV_SIGNING_SECRET)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AgentPayError::validation(ENV_SIGNING_SECRET, "required and must be non-empty")
            })?;

        Ok(Self {
            credential_key_hex,
            signing_secret,
            demo_mode: env_bool(ENV_DEMO_MODE, false),
            max_otp_attempts: env_parse(ENV_MAX_OTP_ATTEMPTS, 3),
            otp_expiry_minutes: env_parse(ENV_OTP_EXPIRY_MINUTES, 5),
            mandate_ttl_minutes: env_parse(ENV_MANDATE_TTL_MINUTES, 30),
            token_ttl_minutes: env_parse(ENV_TOKEN_TTL_MINUTES, 15),
        })
    }

    /// Fixed-key configuration for tests and demos
    pub fn for_tests() -> Self {
        Self {
            credential_key_hex: "11".repeat(32),
            signing_secret: "test_signing_secret".to_string(),
            demo_mode: true,
            max_otp_attempts: 3,
            otp_expiry_minutes: 5,
            mandate_ttl_minutes: 30,
            token_ttl_minutes: 15,
        }
    }

    pub fn otp_expiry(&self) -> Duration {
        Duration::minutes(self.otp_expiry_minutes)
    }

    pub fn mandate_ttl(&self) -> Duration {
        Duration::minutes(self.mandate_ttl_minutes)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::minutes(self.token_ttl_minutes)
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_tests_config() {
        let config = GatewayConfig::for_tests();
        assert!(config.demo_mode);
        assert_eq!(config.max_otp_attempts, 3);
        assert_eq!(config.otp_expiry(), Duration::minutes(5));
        assert_eq!(hex::decode(&config.credential_key_hex).unwrap().len(), 32);
    }
}
