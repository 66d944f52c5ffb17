//! AES-256-GCM sealing of credential data
//!
//! Wire format is `nonce || ciphertext`: a random 96-bit nonce followed
//! by the ciphertext with its 16-byte authentication tag. Decryption
//! failures are deliberately vague - callers cannot distinguish a wrong
//! key from corrupted ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use agentpay_types::{AgentPayError, EncryptedBlob, Result};
use rand::RngCore;

/// AES-256 key length in bytes
pub const KEY_LENGTH: usize = 32;

/// AES-GCM standard nonce length in bytes
pub const NONCE_LENGTH: usize = 12;

/// Seals and opens credential instrument data
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LENGTH],
}

impl CredentialCipher {
    /// Create a cipher from a 32-byte key
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a cipher from a 64-char hex key string
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex).map_err(|_| {
            AgentPayError::validation("credential_key", "key is not valid hex")
        })?;
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            AgentPayError::validation(
                "credential_key",
                format!("key must be {KEY_LENGTH} bytes"),
            )
        })?;
        Ok(Self::new(key))
    }

    /// Encrypt plaintext under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AgentPayError::internal("encryption key rejected"))?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AgentPayError::internal("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(EncryptedBlob(out))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>> {
        let data = blob.as_bytes();
        if data.len() < NONCE_LENGTH {
            return Err(AgentPayError::internal("ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AgentPayError::internal("encryption key rejected"))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AgentPayError::internal("decryption failed"))
    }
}
