//! Supported currency codes and pair keys

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Closed set of currencies the rates feed quotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurrencyCode {
    AUD,
    CAD,
    CHF,
    EUR,
    GBP,
    NZD,
    JPY,
    SGD,
    USD,
}

impl CurrencyCode {
    pub const ALL: [CurrencyCode; 9] = [
        CurrencyCode::AUD,
        CurrencyCode::CAD,
        CurrencyCode::CHF,
        CurrencyCode::EUR,
        CurrencyCode::GBP,
        CurrencyCode::NZD,
        CurrencyCode::JPY,
        CurrencyCode::SGD,
        CurrencyCode::USD,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyCode::AUD => "AUD",
            CurrencyCode::CAD => "CAD",
            CurrencyCode::CHF => "CHF",
            CurrencyCode::EUR => "EUR",
            CurrencyCode::GBP => "GBP",
            CurrencyCode::NZD => "NZD",
            CurrencyCode::JPY => "JPY",
            CurrencyCode::SGD => "SGD",
            CurrencyCode::USD => "USD",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CurrencyCode::ALL
            .into_iter()
            .find(|code| code.as_str() == upper)
            .ok_or_else(|| FeedError::InvalidPair(format!("unsupported currency code `{}`", s)))
    }
}

/// A currency pair, keyed as `FROM` + `TO` (e.g. `JPYUSD`)
///
/// Always formats upper-case so map lookups are exact-match regardless of
/// how the pair was typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl PairKey {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Result<Self, FeedError> {
        if from == to {
            return Err(FeedError::InvalidPair(format!(
                "`{}{}` quotes a currency against itself",
                from, to
            )));
        }
        Ok(Self { from, to })
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl FromStr for PairKey {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 6 || !trimmed.is_ascii() {
            return Err(FeedError::InvalidPair(format!(
                "`{}` is not a six letter pair",
                s
            )));
        }
        let (from, to) = trimmed.split_at(3);
        PairKey::new(from.parse()?, to.parse()?)
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
