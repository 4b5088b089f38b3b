// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base-ten decimal numbers that keep their precision.
//!
//! `1.0`, `1` and `1E+0` are three different values here: the coefficient
//! digits and the exponent are both preserved. The text form follows the
//! General Decimal Arithmetic *to-scientific-string* rules, with the special
//! tokens `Infinity`, `NaN` and `sNaN` (optionally negated).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Plain notation is used while the adjusted exponent stays at or above this.
const MIN_PLAIN_ADJUSTED: i128 = -6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Decimal {
    /// `(-1)^negative * coefficient * 10^exponent`.
    Finite { negative: bool, coefficient: String, exponent: i64 },
    Infinity { negative: bool },
    NaN { negative: bool, signaling: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal {0:?}")]
pub struct DecimalParseError(pub String);

impl Decimal {
    /// Build a finite decimal from its parts. `digits` must be ASCII digits.
    pub fn new(negative: bool, digits: &str, exponent: i64) -> Result<Self, DecimalParseError> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalParseError(digits.to_string()));
        }
        Ok(Self::Finite { negative, coefficient: strip_leading_zeros(digits), exponent })
    }

    pub fn infinity(negative: bool) -> Self {
        Self::Infinity { negative }
    }

    pub fn nan() -> Self {
        Self::NaN { negative: false, signaling: false }
    }

    pub fn signaling_nan() -> Self {
        Self::NaN { negative: false, signaling: true }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Self::Finite { negative, .. }
            | Self::Infinity { negative }
            | Self::NaN { negative, .. } => *negative,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Finite { .. })
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Self::NaN { .. })
    }

    pub fn is_signaling(&self) -> bool {
        matches!(self, Self::NaN { signaling: true, .. })
    }
}

fn strip_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

impl From<i64> for Decimal {
    fn from(n: i64) -> Self {
        Self::Finite { negative: n < 0, coefficient: n.unsigned_abs().to_string(), exponent: 0 }
    }
}

impl FromStr for Decimal {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecimalParseError(s.to_string());
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let lowered = body.to_ascii_lowercase();
        match lowered.as_str() {
            "inf" | "infinity" => return Ok(Self::Infinity { negative }),
            "nan" => return Ok(Self::NaN { negative, signaling: false }),
            "snan" => return Ok(Self::NaN { negative, signaling: true }),
            _ => {}
        }

        let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => {
                let exp_text = &body[pos + 1..];
                let digits = exp_text.trim_start_matches(|c: char| c == '+' || c == '-');
                if digits.is_empty()
                    || exp_text.len() - digits.len() > 1
                    || !digits.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(invalid());
                }
                (&body[..pos], exp_text.parse::<i64>().map_err(|_| invalid())?)
            }
            None => (body, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (mantissa, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.len() + frac_part.len() == 0 || !all_digits(int_part) || !all_digits(frac_part)
        {
            return Err(invalid());
        }

        let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid())?;
        let exponent = exponent.checked_sub(frac_len).ok_or_else(invalid)?;
        Ok(Self::Finite {
            negative,
            coefficient: strip_leading_zeros(&format!("{int_part}{frac_part}")),
            exponent,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        let (coefficient, exponent) = match self {
            Self::Infinity { .. } => return f.write_str("Infinity"),
            Self::NaN { signaling: true, .. } => return f.write_str("sNaN"),
            Self::NaN { signaling: false, .. } => return f.write_str("NaN"),
            Self::Finite { coefficient, exponent, .. } => (coefficient.as_str(), *exponent),
        };

        // Widened so extreme exponents cannot overflow.
        let digits = coefficient.len() as i128;
        let exponent = i128::from(exponent);
        let adjusted = exponent + digits - 1;

        if exponent <= 0 && adjusted >= MIN_PLAIN_ADJUSTED {
            if exponent == 0 {
                return f.write_str(coefficient);
            }
            let point = digits + exponent;
            if point > 0 {
                let (whole, fraction) = coefficient.split_at(point as usize);
                return write!(f, "{whole}.{fraction}");
            }
            let zeros = "0".repeat((-point) as usize);
            return write!(f, "0.{zeros}{coefficient}");
        }

        let (first, rest) = coefficient.split_at(1);
        f.write_str(first)?;
        if !rest.is_empty() {
            write!(f, ".{rest}")?;
        }
        let sign = if adjusted >= 0 { '+' } else { '-' };
        write!(f, "E{sign}{}", adjusted.unsigned_abs())
    }
}

#[cfg(test)]
#[path = "decimal_tests.rs"]
mod tests;
