use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const LTC_CURRENCY_CODE: &str = "LTC";
pub const LTC_CURRENCY_CODE_LOWER: &str = "ltc";
/// The number of litoshi in one Litecoin.
pub const LITOSHI_PER_LTC: i64 = 100_000_000;
const DECIMALS: usize = 8;

//--------------------------------------     Litoshi       ---------------------------------------------------------
/// An amount of Litecoin, in its indivisible base unit.
///
/// All payment amounts in the gateway are carried as `Litoshi`, so that matching a payment against an order is always
/// an exact integer comparison.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Litoshi(i64);

op!(binary Litoshi, Add, add);
op!(binary Litoshi, Sub, sub);
op!(inplace Litoshi, SubAssign, sub_assign);
op!(inplace Litoshi, AddAssign, add_assign);
op!(unary Litoshi, Neg, neg);

impl Mul<i64> for Litoshi {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Litoshi {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented in litoshi: {0}")]
pub struct LitoshiConversionError(String);

impl From<i64> for Litoshi {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Litoshi {
    type Error = LitoshiConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(LitoshiConversionError(format!("Value {} is too large to convert to Litoshi", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

/// Parses a decimal LTC amount, e.g. `"0.25000037"`. Digits beyond the 8th decimal place are truncated, never rounded.
impl FromStr for Litoshi {
    type Err = LitoshiConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_suffix(LTC_CURRENCY_CODE).map(str::trim_end).unwrap_or(s);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let is_digits = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(LitoshiConversionError(format!("'{s}' is not a valid LTC amount")));
        }
        let whole = if whole.is_empty() {
            0
        } else {
            whole.parse::<i64>().map_err(|e| LitoshiConversionError(format!("{s}: {e}")))?
        };
        let mut frac = frac.chars().take(DECIMALS).collect::<String>();
        while frac.len() < DECIMALS {
            frac.push('0');
        }
        let frac = frac.parse::<i64>().map_err(|e| LitoshiConversionError(format!("{s}: {e}")))?;
        whole
            .checked_mul(LITOSHI_PER_LTC)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or_else(|| LitoshiConversionError(format!("{s} overflows")))
    }
}

impl Display for Litoshi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {LTC_CURRENCY_CODE}", self.to_ltc_string())
    }
}

impl Litoshi {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_ltc(ltc: i64) -> Self {
        Self(ltc * LITOSHI_PER_LTC)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn abs_diff(&self, other: Litoshi) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// `None` if the sum does not fit in an `i64`.
    pub fn checked_add(self, rhs: Litoshi) -> Option<Litoshi> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// The amount in LTC at full (8 decimal place) precision, without the currency code.
    pub fn to_ltc_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let v = self.0.unsigned_abs();
        let per = LITOSHI_PER_LTC.unsigned_abs();
        format!("{sign}{}.{:08}", v / per, v % per)
    }
}
