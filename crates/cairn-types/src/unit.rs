use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Currency or unit of account.
///
/// `Unknown` is an explicit value, not an error: an account whose unit has
/// not been resolved yet is stored under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitType {
    Unknown,
    Btc,
    Bch,
    Ltc,
    Eth,
    Usd,
    Eur,
    Regtest,
}

impl UnitType {
    /// Returns `true` for blockchain-backed units.
    pub fn is_blockchain(&self) -> bool {
        matches!(self, Self::Btc | Self::Bch | Self::Ltc | Self::Eth | Self::Regtest)
    }

    pub fn ticker(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Btc => "BTC",
            Self::Bch => "BCH",
            Self::Ltc => "LTC",
            Self::Eth => "ETH",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Regtest => "UNITTEST",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for UnitType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.to_ascii_uppercase().as_str() {
            "UNKNOWN" => Self::Unknown,
            "BTC" => Self::Btc,
            "BCH" => Self::Bch,
            "LTC" => Self::Ltc,
            "ETH" => Self::Eth,
            "USD" => Self::Usd,
            "EUR" => Self::Eur,
            "UNITTEST" => Self::Regtest,
            _ => return Err(TypeError::UnknownUnit(s.to_string())),
        };
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_roundtrip() {
        for unit in [UnitType::Unknown, UnitType::Btc, UnitType::Usd, UnitType::Regtest] {
            assert_eq!(unit.ticker().parse::<UnitType>().unwrap(), unit);
        }
    }

    #[test]
    fn unknown_string_is_an_error() {
        assert!("DOGE".parse::<UnitType>().is_err());
    }

    #[test]
    fn blockchain_classification() {
        assert!(UnitType::Btc.is_blockchain());
        assert!(!UnitType::Usd.is_blockchain());
        assert!(!UnitType::Unknown.is_blockchain());
    }
}
