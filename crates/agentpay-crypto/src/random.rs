//! Secure random generation for tokens, OTP codes and nonces
//!
//! Everything here draws from the OS CSPRNG. OTP digits use rejection
//! sampling so the distribution is uniform.

use rand::rngs::OsRng;
use rand::RngCore;

/// Byte length of a token bearer value
const TOKEN_VALUE_BYTES: usize = 32;

/// Byte length of a signing nonce
const NONCE_BYTES: usize = 16;

/// Generate an opaque token bearer value (64 hex chars)
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_VALUE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a signing nonce (32 hex chars)
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fixed-width numeric OTP code
///
/// Each digit is drawn independently with rejection sampling, so
/// "000000" is exactly as likely as any other code.
pub fn generate_otp(digits: usize) -> String {
    let mut code = String::with_capacity(digits);
    for _ in 0..digits {
        code.push(char::from(b'0' + uniform_digit()));
    }
    code
}

fn uniform_digit() -> u8 {
    // Reject values above the largest multiple of 10 that fits in a byte
    loop {
        let mut byte = [0u8; 1];
        OsRng.fill_bytes(&mut byte);
        if byte[0] < 250 {
            return byte[0] % 10;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_value_length_and_uniqueness() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_otp_is_fixed_width_numeric() {
        for _ in 0..100 {
            let code = generate_otp(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_nonce_length() {
        assert_eq!(generate_nonce().len(), 32);
    }
}
