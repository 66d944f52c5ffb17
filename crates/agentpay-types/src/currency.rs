//! Currency types for AgentPay

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported settlement currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    TWD,
    EUR,
    JPY,
}

impl Currency {
    /// All currencies the protocol accepts
    pub const ALL: [Currency; 4] = [Self::USD, Self::TWD, Self::EUR, Self::JPY];

    /// Get the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::TWD => "TWD",
            Self::EUR => "EUR",
            Self::JPY => "JPY",
        }
    }

    /// Get the standard decimal places for this currency
    pub fn decimals(&self) -> u8 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Parse an ISO code, case-insensitive
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "TWD" => Some(Self::TWD),
            "EUR" => Some(Self::EUR),
            "JPY" => Some(Self::JPY),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
