//! Interval limit keys and their calendar units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity a booking limit applies to.
///
/// Variants are declared finest to coarsest, so the derived `Ord` matches the
/// evaluation order. The engine still iterates [`ASCENDING_LIMIT_KEYS`] rather
/// than relying on any map's iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalLimitKey {
    /// Limit per calendar day
    PerDay,
    /// Limit per calendar week
    PerWeek,
    /// Limit per calendar month
    PerMonth,
    /// Limit per calendar year
    PerYear,
}

/// Every limit key, finest granularity first.
pub const ASCENDING_LIMIT_KEYS: [IntervalLimitKey; 4] = [
    IntervalLimitKey::PerDay,
    IntervalLimitKey::PerWeek,
    IntervalLimitKey::PerMonth,
    IntervalLimitKey::PerYear,
];

/// Calendar unit an interval limit key is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalLimitKey {
    /// The calendar unit this key limits.
    pub fn unit(&self) -> IntervalUnit {
        match self {
            IntervalLimitKey::PerDay => IntervalUnit::Day,
            IntervalLimitKey::PerWeek => IntervalUnit::Week,
            IntervalLimitKey::PerMonth => IntervalUnit::Month,
            IntervalLimitKey::PerYear => IntervalUnit::Year,
        }
    }

    /// The configuration name of this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalLimitKey::PerDay => "PER_DAY",
            IntervalLimitKey::PerWeek => "PER_WEEK",
            IntervalLimitKey::PerMonth => "PER_MONTH",
            IntervalLimitKey::PerYear => "PER_YEAR",
        }
    }
}

impl fmt::Display for IntervalLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalLimitKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ASCENDING_LIMIT_KEYS
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown interval limit key `{}`", s))
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        };
        f.write_str(name)
    }
}
