//! Exact decimal money
//!
//! Amounts are kept as an integer mantissa and a decimal scale so that the
//! unified model never goes through floating point. Conversion to a platform's
//! integer unit (micros, cents, ...) rounds half-to-even exactly once.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Largest supported number of fractional digits
const MAX_SCALE: u32 = 18;

/// A decimal amount of money in the ad's currency
#[derive(Debug, Clone, Copy)]
pub struct Money {
    mantissa: i64,
    scale: u32,
}

impl Money {
    /// Build an amount from a mantissa and a scale (`value = mantissa / 10^scale`)
    pub fn new(mantissa: i64, scale: u32) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(Error::validation(format!(
                "money scale {} exceeds maximum of {}",
                scale, MAX_SCALE
            )));
        }
        Ok(Self { mantissa, scale })
    }

    /// Zero
    pub fn zero() -> Self {
        Self {
            mantissa: 0,
            scale: 0,
        }
    }

    /// Build an amount from a platform's native integer units
    ///
    /// `decimals` is the number of decimal digits one native unit represents,
    /// e.g. 6 for micro-currency or 2 for cents.
    pub fn from_units(units: i64, decimals: u32) -> Result<Self> {
        Ok(Self::new(units, decimals)?.normalized())
    }

    /// Convert into a platform's native integer units, rounding half-to-even.
    pub fn to_units(&self, decimals: u32) -> Result<i64> {
        if decimals > MAX_SCALE {
            return Err(Error::validation(format!(
                "unit precision {} exceeds maximum of {}",
                decimals, MAX_SCALE
            )));
        }

        let mantissa = self.mantissa as i128;
        let value = if decimals >= self.scale {
            mantissa * 10i128.pow(decimals - self.scale)
        } else {
            let divisor = 10i128.pow(self.scale - decimals);
            let quotient = mantissa / divisor;
            let twice_remainder = 2 * (mantissa % divisor).abs();
            let round_away = twice_remainder > divisor
                || (twice_remainder == divisor && quotient % 2 != 0);
            if round_away {
                quotient + mantissa.signum()
            } else {
                quotient
            }
        };

        i64::try_from(value)
            .map_err(|_| Error::validation(format!("amount {} overflows native units", self)))
    }

    /// Whether the amount is strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.mantissa > 0
    }

    /// Same value with trailing fractional zeros removed
    pub fn normalized(&self) -> Self {
        let mut out = *self;
        while out.scale > 0 && out.mantissa % 10 == 0 {
            out.mantissa /= 10;
            out.scale -= 1;
        }
        out
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.mantissa == b.mantissa && a.scale == b.scale
    }
}

impl Eq for Money {}

impl Hash for Money {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let n = self.normalized();
        n.mantissa.hash(state);
        n.scale.hash(state);
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        let divisor = 10u64.pow(self.scale);
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / divisor,
            abs % divisor,
            width = self.scale as usize
        )
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::validation(format!("invalid money amount: '{}'", s));

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let scale = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
        let joined = format!("{}{}", int_part, frac_part);
        let mut mantissa: i64 = if joined.is_empty() {
            0
        } else {
            joined.parse().map_err(|_| invalid())?
        };
        if negative {
            mantissa = -mantissa;
        }
        Money::new(mantissa, scale)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Number of minor-unit digits for an ISO-4217 currency code
pub fn currency_minor_digits(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "PYG" | "UGX" => 0,
        "BHD" | "KWD" | "JOD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}
