//! Error types for booking limit checks.

use std::time::Duration;
use thiserror::Error;

use crate::limits::IntervalLimitKey;

/// Main error type for booking limit operations.
#[derive(Error, Debug)]
pub enum BookingLimitError {
    /// The raw limit mapping for an event type is malformed
    #[error("Invalid limit configuration: {0}")]
    InvalidLimitConfiguration(String),

    /// The organizer timezone is not a known IANA zone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// An interval limit is already at capacity
    #[error("booking_limit_reached: {key} allows {maximum}, {count} already accepted")]
    LimitExceeded {
        key: IntervalLimitKey,
        count: u64,
        maximum: u64,
    },

    /// The limits could not be evaluated
    #[error("Booking limit evaluation failed: {0}")]
    EvaluationFailed(#[from] EvaluationFailed),

    /// Service configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BookingLimitError {
    /// HTTP status the booking-creation boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            BookingLimitError::LimitExceeded { .. } => 403,
            BookingLimitError::EvaluationFailed(_) => 401,
            BookingLimitError::InvalidLimitConfiguration(_)
            | BookingLimitError::InvalidTimezone(_) => 400,
            BookingLimitError::Config(_) | BookingLimitError::Io(_) => 500,
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingLimitError::EvaluationFailed(_))
    }
}

/// Infrastructure failure while evaluating limits.
///
/// Never produced for a limit that is merely at capacity.
#[derive(Error, Debug)]
pub enum EvaluationFailed {
    /// A counting query failed
    #[error("counting bookings for {key} failed: {source}")]
    Store {
        key: IntervalLimitKey,
        #[source]
        source: CounterError,
    },

    /// The caller cancelled before every limit was evaluated
    #[error("cancelled before all limits were evaluated")]
    Cancelled,

    /// The evaluation deadline passed before every limit was evaluated
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors reported by a [`BookingCounter`](crate::limits::BookingCounter).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The counting store could not be reached
    #[error("booking store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the query
    #[error("booking count query failed: {0}")]
    Query(String),
}

/// Result type alias for booking limit operations.
pub type Result<T> = std::result::Result<T, BookingLimitError>;
