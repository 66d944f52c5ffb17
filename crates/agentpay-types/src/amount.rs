//! Amount type with minor-unit fixed-point arithmetic
//!
//! Amounts are stored in each currency's smallest unit (cents for USD)
//! as an i64, so arithmetic is exact and overflow-checked. Floating
//! point only appears at the display boundary.

use crate::{AgentPayError, Currency, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in a specific currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in the currency's smallest unit (e.g. cents)
    pub minor: i64,
    /// The currency
    pub currency: Currency,
}

impl Amount {
    /// Create an amount from minor units
    pub fn from_minor(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Create a zero amount
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Create an amount from a major-unit value (e.g. 150.0 USD)
    ///
    /// Rounds to the nearest minor unit.
    pub fn from_major(major: f64, currency: Currency) -> Self {
        let multiplier = 10i64.pow(currency.decimals() as u32);
        Self {
            minor: (major * multiplier as f64).round() as i64,
            currency,
        }
    }

    /// Get the major-unit value (display only)
    pub fn to_major(&self) -> f64 {
        let divisor = 10i64.pow(self.currency.decimals() as u32) as f64;
        self.minor as f64 / divisor
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Checked addition (currencies must match)
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or_else(|| AgentPayError::internal("amount overflow"))?;
        Ok(Self { minor, ..self })
    }

    /// Checked subtraction (currencies must match)
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or_else(|| AgentPayError::internal("amount underflow"))?;
        Ok(Self { minor, ..self })
    }

    /// Checked multiplication by a unit count
    pub fn checked_mul(self, quantity: u32) -> Result<Self> {
        let minor = self
            .minor
            .checked_mul(quantity as i64)
            .ok_or_else(|| AgentPayError::internal("amount overflow"))?;
        Ok(Self { minor, ..self })
    }

    /// The smaller of two same-currency amounts
    pub fn min(self, other: Self) -> Self {
        if other.minor < self.minor {
            other
        } else {
            self
        }
    }

    fn require_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency != other.currency {
            return Err(AgentPayError::Validation {
                field: "currency".to_string(),
                reason: format!("expected {}, got {}", self.currency, other.currency),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = self.currency.decimals() as usize;
        write!(
            f,
            "{:.*} {}",
            decimals,
            self.to_major(),
            self.currency.code()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_roundtrip() {
        let amount = Amount::from_major(999.99, Currency::USD);
        assert_eq!(amount.minor, 99999);
        assert!((amount.to_major() - 999.99).abs() < 1e-9);
    }

    #[test]
    fn test_jpy_has_no_minor_units() {
        let amount = Amount::from_major(1500.0, Currency::JPY);
        assert_eq!(amount.minor, 1500);
    }

    #[test]
    fn test_checked_add() {
        let a = Amount::from_major(100.0, Currency::USD);
        let b = Amount::from_major(50.5, Currency::USD);
        assert_eq!(a.checked_add(b).unwrap(), Amount::from_minor(15050, Currency::USD));
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Amount::from_major(100.0, Currency::USD);
        let b = Amount::from_major(100.0, Currency::TWD);
        assert!(matches!(
            a.checked_add(b),
            Err(AgentPayError::Validation { .. })
        ));
    }

    #[test]
    fn test_checked_mul() {
        let price = Amount::from_major(99.99, Currency::USD);
        assert_eq!(price.checked_mul(2).unwrap().minor, 19998);
    }

    #[test]
    fn test_display() {
        let amount = Amount::from_major(999.0, Currency::USD);
        assert_eq!(amount.to_string(), "999.00 USD");
    }
}
