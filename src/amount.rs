//! Validation of user-entered donation amounts.
//!
//! Both the slider and the free-text input feed [`AmountBounds::validate`] or
//! [`AmountBounds::validate_value`]; fractional values are accepted on either
//! path. Values outside the configured bounds are clamped, never rejected.
//! Input that does not describe a positive number is reported as unset
//! (`None`) so the submit action can be disabled downstream.

use std::fmt;

use thiserror::Error;

use crate::interfaces::Wei;

/// Decimals of the chain's native currency.
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount `{0}` is not a decimal number")]
    Malformed(String),
    #[error("amount `{0}` does not fit into a wei value")]
    Overflow(String),
}

/// A validated donation amount in units of the native currency.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct DonationAmount(f64);

impl DonationAmount {
    pub fn value(self) -> f64 {
        self.0
    }

    /// Converts the amount into wei using its decimal representation so that
    /// e.g. `0.3` becomes exactly `300000000000000000`.
    pub fn to_wei(self) -> Result<Wei, AmountError> {
        parse_units(&self.0.to_string(), NATIVE_DECIMALS)
    }
}

impl fmt::Display for DonationAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive bounds every donation amount is clamped into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmountBounds {
    min: f64,
    max: f64,
}

impl AmountBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Validates raw text from the number input.
    pub fn validate(&self, raw: &str) -> Option<DonationAmount> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: f64 = trimmed.parse().ok()?;
        self.validate_value(value)
    }

    /// Validates a numeric value coming from the slider.
    pub fn validate_value(&self, value: f64) -> Option<DonationAmount> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        Some(DonationAmount(value.clamp(self.min, self.max)))
    }
}

impl Default for AmountBounds {
    fn default() -> Self {
        Self::new(1.0, 100.0)
    }
}

/// Text shown in the amount input. An unset amount renders empty, never `0`.
pub fn display_amount(amount: Option<DonationAmount>) -> String {
    amount.map(|amount| amount.to_string()).unwrap_or_default()
}

/// Parses a decimal string into an integer amount with `decimals` fractional
/// digits. Digits beyond `decimals` are truncated.
pub fn parse_units(text: &str, decimals: u32) -> Result<Wei, AmountError> {
    let malformed = || AmountError::Malformed(text.to_string());
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(malformed());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(malformed());
    }

    let scale = 10u128.pow(decimals);
    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| malformed())?
    };
    let mut fraction_digits: String = fraction.chars().take(decimals as usize).collect();
    while fraction_digits.len() < decimals as usize {
        fraction_digits.push('0');
    }
    let fraction_value = if fraction_digits.is_empty() {
        0
    } else {
        fraction_digits.parse::<u128>().map_err(|_| malformed())?
    };

    whole_value
        .checked_mul(scale)
        .and_then(|value| value.checked_add(fraction_value))
        .map(Wei)
        .ok_or_else(|| AmountError::Overflow(text.to_string()))
}
