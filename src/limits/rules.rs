//! Booking limit rules and parsing.
//!
//! An event type's booking limits arrive as an untyped mapping of interval key
//! to maximum count, e.g. `{"PER_DAY": 2, "PER_MONTH": 20}`. This module turns
//! that mapping into an [`IntervalLimitSet`] or rejects it.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;

use super::key::{IntervalLimitKey, ASCENDING_LIMIT_KEYS};
use crate::error::{BookingLimitError, Result};

/// Validated booking limits for one event type.
///
/// Every present key maps to a positive maximum. Absent keys mean no limit at
/// that granularity, and an empty set always admits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalLimitSet {
    limits: HashMap<IntervalLimitKey, u64>,
}

impl IntervalLimitSet {
    /// Create a set with no limits configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw limit mapping.
    ///
    /// `None`, `null` and `{}` all yield an empty set.
    pub fn parse(raw: Option<&Value>) -> Result<Self> {
        let entries = match raw {
            None | Some(Value::Null) => return Ok(Self::new()),
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                return Err(invalid(format!(
                    "expected a mapping of interval keys to counts, got {}",
                    value_kind(other)
                )))
            }
        };

        let mut set = Self::new();
        for (name, value) in entries {
            let key: IntervalLimitKey = name.parse().map_err(invalid)?;
            let maximum = value
                .as_u64()
                .filter(|maximum| *maximum > 0)
                .ok_or_else(|| {
                    invalid(format!("{} must be a positive integer, got {}", key, value))
                })?;
            set.limits.insert(key, maximum);
        }

        Ok(set)
    }

    /// Parse a raw limit mapping from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| invalid(format!("failed to parse limit mapping: {}", e)))?;
        Self::parse(Some(&value))
    }

    /// Set the maximum for a key, replacing any previous value.
    pub fn with_limit(mut self, key: IntervalLimitKey, maximum: u64) -> Result<Self> {
        if maximum == 0 {
            return Err(invalid(format!("{} must be a positive integer, got 0", key)));
        }
        self.limits.insert(key, maximum);
        Ok(self)
    }

    /// The configured maximum for a key, if any.
    pub fn get(&self, key: IntervalLimitKey) -> Option<u64> {
        self.limits.get(&key).copied()
    }

    /// Configured limits, finest granularity first.
    pub fn iter_ascending(&self) -> impl Iterator<Item = (IntervalLimitKey, u64)> + '_ {
        ASCENDING_LIMIT_KEYS
            .iter()
            .filter_map(move |key| self.get(*key).map(|maximum| (*key, maximum)))
    }

    /// Number of configured limits.
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    /// Whether no limit is configured.
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

impl Serialize for IntervalLimitSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, maximum) in self.iter_ascending() {
            map.serialize_entry(key.as_str(), &maximum)?;
        }
        map.end()
    }
}

fn invalid(message: String) -> BookingLimitError {
    BookingLimitError::InvalidLimitConfiguration(message)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
