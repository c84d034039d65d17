//! Currency codes and exact-decimal amount comparison.
//!
//! Amounts are always `rust_decimal::Decimal`; the only tolerance the domain
//! accepts is one minor unit of the invoice currency.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// ISO-4217 style currency code (three ASCII letters, stored upper-case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency code must be three letters, got '{code}'"
            )));
        }
        Ok(Self(code))
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places in the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            "KWD" | "BHD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        }
    }

    /// One minor unit, the tolerance used for all amount comparisons.
    pub fn epsilon(&self) -> Decimal {
        Decimal::new(1, self.minor_units())
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// `true` when `a` and `b` differ by at most one minor unit of `currency`.
pub fn amounts_agree(a: Decimal, b: Decimal, currency: &Currency) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= currency.epsilon())
}
