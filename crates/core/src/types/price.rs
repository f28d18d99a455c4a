//! Money amounts and currency conversion.
//!
//! All amounts are `Decimal` in the currency's standard unit (dollars, not
//! cents). The payment processor speaks minor units, so conversions live here.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round an amount to two decimal places, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a standard-unit amount to minor units (e.g. 22.00 -> 2200).
///
/// Returns `None` when the amount does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Convert a minor-unit amount reported by the processor back to a
/// two-decimal standard-unit amount.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// ISO 4217 currency codes accepted by the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl CurrencyCode {
    /// Lower-case code as sent to the payment processor.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Cad => "cad",
            Self::Aud => "aud",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Usd | Self::Cad | Self::Aud => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }

    /// Format an amount for display, e.g. `$22.00`.
    #[must_use]
    pub fn format(self, amount: Decimal) -> String {
        format!("{}{:.2}", self.symbol(), round_money(amount))
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "cad" => Ok(Self::Cad),
            "aud" => Ok(Self::Aud),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_to_minor_units_rounds() {
        assert_eq!(to_minor_units(Decimal::from_str("22.00").unwrap()), Some(2200));
        assert_eq!(to_minor_units(Decimal::from_str("10.005").unwrap()), Some(1001));
        assert_eq!(to_minor_units(Decimal::ZERO), Some(0));
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(from_minor_units(2200), Decimal::from_str("22.00").unwrap());
        assert_eq!(from_minor_units(4599).to_string(), "45.99");
    }

    #[test]
    fn test_currency_parse_and_format() {
        let gbp = CurrencyCode::from_str("GBP").unwrap();
        assert_eq!(gbp.code(), "gbp");
        assert_eq!(gbp.format(Decimal::new(45, 0)), "£45.00");
        assert!(CurrencyCode::from_str("xyz").is_err());
    }
}
