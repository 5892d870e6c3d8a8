//! Configuration management for booking limit checks.

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{BookingLimitError, Result};
use crate::limits::{BookingStatus, EventTypeId, IntervalLimitSet, IntervalResolver};

/// Main configuration for booking limit checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingLimitsConfig {
    /// Admission engine configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Event types and their raw booking limits
    #[serde(default)]
    pub event_types: Vec<EventTypeConfig>,

    /// Existing bookings used to seed an in-memory store
    #[serde(default)]
    pub bookings: Vec<BookingFixture>,
}

/// Admission engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// IANA zone used when a booking has no organizer timezone
    #[serde(default = "default_reference_timezone")]
    pub reference_timezone: String,

    /// First day of a calendar week
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,

    /// Deadline for evaluating all limits of one booking, in milliseconds
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            reference_timezone: default_reference_timezone(),
            week_start: default_week_start(),
            evaluation_timeout_ms: default_evaluation_timeout(),
        }
    }
}

fn default_reference_timezone() -> String {
    "UTC".to_string()
}

fn default_week_start() -> Weekday {
    Weekday::Sun
}

fn default_evaluation_timeout() -> u64 {
    5000
}

impl AdmissionConfig {
    /// Build the interval resolver this configuration describes.
    pub fn resolver(&self) -> Result<IntervalResolver> {
        let reference: Tz = self.reference_timezone.parse().map_err(|_| {
            BookingLimitError::Config(format!(
                "unknown reference timezone `{}`",
                self.reference_timezone
            ))
        })?;
        Ok(IntervalResolver::new(reference, self.week_start))
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }
}

/// Raw booking limits of one event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTypeConfig {
    pub id: EventTypeId,
    /// Mapping of interval key to maximum, validated on load
    #[serde(default)]
    pub booking_limits: Option<serde_json::Value>,
}

/// A stored booking in a configuration fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingFixture {
    pub event_type_id: EventTypeId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_booking_status")]
    pub status: BookingStatus,
}

fn default_booking_status() -> BookingStatus {
    BookingStatus::Accepted
}

impl BookingLimitsConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading booking limits configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// The admission section and every event type's limits are validated here,
    /// so a bad configuration never reaches a booking check.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BookingLimitsConfig = serde_yaml::from_str(yaml)
            .map_err(|e| BookingLimitError::Config(format!("Failed to parse config: {}", e)))?;

        config.admission.resolver()?;
        config.event_limit_sets()?;
        Ok(config)
    }

    /// Parse every event type's limits.
    pub fn event_limit_sets(&self) -> Result<HashMap<EventTypeId, IntervalLimitSet>> {
        self.event_types
            .iter()
            .map(|event_type| {
                let limits = IntervalLimitSet::parse(event_type.booking_limits.as_ref())
                    .map_err(|e| match e {
                        BookingLimitError::InvalidLimitConfiguration(message) => {
                            BookingLimitError::InvalidLimitConfiguration(format!(
                                "event type {}: {}",
                                event_type.id, message
                            ))
                        }
                        other => other,
                    })?;
                Ok((event_type.id, limits))
            })
            .collect()
    }
}
