//! KAS amounts held as integer sompi, and the fee attached to each transfer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{AMOUNT_PRECISION, FEE_ADDRESS, FEE_MEMO, FEE_RATE_BPS};

/// Sompi per KAS.
pub const SOMPI_PER_KAS: u64 = 10u64.pow(AMOUNT_PRECISION);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("'{0}' is not a decimal number")]
    Malformed(String),
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount is too large")]
    Overflow,
}

/// A KAS amount with 8 fractional digits of precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_sompi(sompi: u64) -> Self { Self(sompi) }
    pub fn sompi(&self) -> u64 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Parse a user-typed decimal. Digits beyond the 8th fractional place
    /// are rounded half-up. Zero is accepted here; see
    /// [`Amount::parse_positive`] for transfer amounts.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let malformed = || AmountError::Malformed(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| AmountError::Overflow)? };
        let precision = AMOUNT_PRECISION as usize;
        let (kept, rest) = frac.split_at(frac.len().min(precision));
        let mut fraction: u64 = if kept.is_empty() { 0 } else { kept.parse().map_err(|_| malformed())? };
        fraction *= 10u64.pow((precision - kept.len()) as u32);
        if rest.bytes().next().is_some_and(|b| b >= b'5') {
            fraction += 1;
        }

        whole
            .checked_mul(SOMPI_PER_KAS)
            .and_then(|w| w.checked_add(fraction))
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// [`Amount::parse`], refusing anything that rounds to zero sompi.
    pub fn parse_positive(input: &str) -> Result<Self, AmountError> {
        let amount = Self::parse(input)?;
        if amount.is_zero() {
            return Err(AmountError::NotPositive);
        }
        Ok(amount)
    }

    /// Fixed 8-digit rendering, e.g. `0.01000000`.
    pub fn to_fixed(&self) -> String {
        format!("{}.{:0width$}", self.0 / SOMPI_PER_KAS, self.0 % SOMPI_PER_KAS, width = AMOUNT_PRECISION as usize)
    }
}

impl fmt::Display for Amount {
    /// Shortest decimal rendering (`10`, `0.01`); this is what the wallet receives.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SOMPI_PER_KAS;
        let frac = self.0 % SOMPI_PER_KAS;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{:0width$}", frac, width = AMOUNT_PRECISION as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

/// Developer fee attached to every transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSpec {
    /// Basis points of the transfer amount.
    pub rate_bps: u32,
    pub address: String,
    pub memo: String,
}

impl Default for FeeSpec {
    fn default() -> Self {
        Self { rate_bps: FEE_RATE_BPS, address: FEE_ADDRESS.into(), memo: FEE_MEMO.into() }
    }
}

impl FeeSpec {
    /// `round(amount × rate)` at sompi precision, half-up.
    pub fn fee_for(&self, amount: Amount) -> Amount {
        let scaled = amount.0 as u128 * self.rate_bps as u128;
        Amount(((scaled + 5_000) / 10_000) as u64)
    }

    /// Rate as a percentage string, e.g. `0.1%`.
    pub fn rate_display(&self) -> String {
        let pct = self.rate_bps as f64 / 100.0;
        format!("{pct}%")
    }
}

/// Text shown under the form: `"10 KAS + 0.01000000 KAS fee"`, or `"0 KAS"`
/// when nothing parsable is typed.
pub fn fee_preview(fee: &FeeSpec, input: &str) -> String {
    match Amount::parse(input) {
        Ok(amount) => format!("{amount} KAS + {} KAS fee", fee.fee_for(amount).to_fixed()),
        Err(_) => "0 KAS".into(),
    }
}
