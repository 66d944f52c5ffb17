//! Keyed-hash mandate signing
//!
//! Signatures are HMAC-SHA256 over the serialized payload struct, hex
//! encoded. Payload structs have a fixed field order, so serialization
//! is canonical and signatures are deterministic for identical payloads.
//! Verification is constant-time.

use agentpay_types::{AgentPayError, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag recorded in every signature slot
pub const SIGNATURE_ALGORITHM: &str = "HMAC-SHA256";

/// Produces and verifies deterministic keyed-hash signatures
#[derive(Clone)]
pub struct MandateSigner {
    key: Vec<u8>,
}

impl MandateSigner {
    /// Create a signer from secret key material
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Sign a payload, returning the hex-encoded signature
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| AgentPayError::internal(format!("payload serialization failed: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AgentPayError::internal(format!("signer key rejected: {e}")))?;
        mac.update(&bytes);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a hex signature against a payload in constant time
    pub fn verify<T: Serialize>(&self, payload: &T, signature_hex: &str) -> Result<bool> {
        let expected = hex::decode(signature_hex).map_err(|_| {
            AgentPayError::validation("signature", "signature is not valid hex")
        })?;
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| AgentPayError::internal(format!("payload serialization failed: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AgentPayError::internal(format!("signer key rejected: {e}")))?;
        mac.update(&bytes);
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload<'a> {
        mandate_id: &'a str,
        total: i64,
        nonce: &'a str,
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = MandateSigner::new(b"test_secret");
        let payload = Payload {
            mandate_id: "mandate_1",
            total: 99999,
            nonce: "abc",
        };

        let a = signer.sign(&payload).unwrap();
        let b = signer.sign(&payload).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // 32 bytes hex
    }

    #[test]
    fn test_verify_roundtrip() {
        let signer = MandateSigner::new(b"test_secret");
        let payload = Payload {
            mandate_id: "mandate_1",
            total: 99999,
            nonce: "abc",
        };

        let sig = signer.sign(&payload).unwrap();
        assert!(signer.verify(&payload, &sig).unwrap());
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let signer = MandateSigner::new(b"test_secret");
        let payload = Payload {
            mandate_id: "mandate_1",
            total: 99999,
            nonce: "abc",
        };
        let tampered = Payload {
            mandate_id: "mandate_1",
            total: 1,
            nonce: "abc",
        };

        let sig = signer.sign(&payload).unwrap();
        assert!(!signer.verify(&tampered, &sig).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let payload = Payload {
            mandate_id: "mandate_1",
            total: 99999,
            nonce: "abc",
        };

        let sig = MandateSigner::new(b"key_one").sign(&payload).unwrap();
        assert!(!MandateSigner::new(b"key_two").verify(&payload, &sig).unwrap());
    }

    #[test]
    fn test_verify_rejects_non_hex() {
        let signer = MandateSigner::new(b"test_secret");
        let payload = Payload {
            mandate_id: "mandate_1",
            total: 1,
            nonce: "abc",
        };
        assert!(signer.verify(&payload, "not-hex!").is_err());
    }

    #[test]
    fn test_different_nonce_different_signature() {
        let signer = MandateSigner::new(b"test_secret");
        let a = signer
            .sign(&Payload { mandate_id: "m", total: 1, nonce: "n1" })
            .unwrap();
        let b = signer
            .sign(&Payload { mandate_id: "m", total: 1, nonce: "n2" })
            .unwrap();
        assert_ne!(a, b);
    }
}
