//! Wide integer parsing for adversarial numeric text.
//!
//! Test values deliberately sit at or past native range boundaries, so text
//! is parsed into a 128-bit magnitude plus sign and only then range-checked
//! against the target width.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("empty numeric text")]
    Empty,
    #[error("invalid digit '{ch}' in '{text}'")]
    InvalidDigit { text: String, ch: char },
    #[error("'{0}' exceeds 128 bits")]
    TooWide(String),
    #[error("'{text}' is out of range for {kind}")]
    OutOfRange { text: String, kind: String },
}

impl NumberError {
    /// Whether the text was a well-formed number that simply does not fit.
    pub fn is_range(&self) -> bool {
        matches!(self, NumberError::TooWide(_) | NumberError::OutOfRange { .. })
    }
}

/// A parsed integer: sign plus 128-bit magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WideInt {
    pub negative: bool,
    pub magnitude: u128,
}

impl WideInt {
    /// Parse decimal text with an optional sign, or `0x`-prefixed hex.
    pub fn parse(text: &str) -> Result<Self, NumberError> {
        let trimmed = text.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (digits, radix) = match unsigned
            .strip_prefix("0x")
            .or_else(|| unsigned.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16u32),
            None => (unsigned, 10u32),
        };

        if digits.is_empty() {
            return Err(NumberError::Empty);
        }

        let mut magnitude: u128 = 0;
        for ch in digits.chars() {
            let digit = ch.to_digit(radix).ok_or_else(|| NumberError::InvalidDigit {
                text: text.to_string(),
                ch,
            })?;
            magnitude = magnitude
                .checked_mul(u128::from(radix))
                .and_then(|m| m.checked_add(u128::from(digit)))
                .ok_or_else(|| NumberError::TooWide(text.to_string()))?;
        }

        Ok(WideInt {
            negative: negative && magnitude != 0,
            magnitude,
        })
    }

    /// Range-check as an unsigned integer of `bits` width (at most 64).
    pub fn to_unsigned(&self, bits: u32) -> Result<u64, NumberError> {
        let max = if bits >= 64 {
            u128::from(u64::MAX)
        } else {
            (1u128 << bits) - 1
        };
        if self.negative || self.magnitude > max {
            return Err(self.out_of_range(format!("uint{}", bits)));
        }
        Ok(self.magnitude as u64)
    }

    /// Range-check as a two's complement integer of `bits` width (at most 64).
    pub fn to_signed(&self, bits: u32) -> Result<i64, NumberError> {
        let bits = bits.min(64);
        let limit = 1u128 << (bits - 1);
        let fits = if self.negative {
            self.magnitude <= limit
        } else {
            self.magnitude < limit
        };
        if !fits {
            return Err(self.out_of_range(format!("sint{}", bits)));
        }
        let value = self.magnitude as i128;
        let signed = if self.negative { -value } else { value };
        Ok(signed as i64)
    }

    fn out_of_range(&self, kind: String) -> NumberError {
        NumberError::OutOfRange {
            text: self.to_string(),
            kind,
        }
    }
}

impl fmt::Display for WideInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}
