use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::LitoshiConversionError;

/// A fiat amount in hundredths of the currency unit. Product prices and exchange rates are kept in cents so that
/// quoting never touches floating point.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let v = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", v / 100, v % 100)
    }
}

/// Parses "85.5" or "85.50" style fiat amounts. Extra decimal places are truncated.
impl FromStr for Cents {
    type Err = LitoshiConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Re-use the litoshi parser, which is exact, and scale down from 8 to 2 decimals
        let l = s.parse::<crate::Litoshi>()?;
        Ok(Self(l.value() / 1_000_000))
    }
}
