//! Evaluation of a single interval limit.

use serde::Serialize;
use tracing::{debug, trace};

use super::backend::{BookingCountQuery, BookingCounter};
use super::engine::ProposedBooking;
use super::interval::{Interval, IntervalResolver};
use super::key::IntervalLimitKey;
use crate::error::EvaluationFailed;

/// Outcome of checking one limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LimitOutcome {
    /// Capacity remains, or no limit is configured for the key
    Pass,
    /// `count` accepted bookings already fill the interval
    Fail {
        key: IntervalLimitKey,
        count: u64,
        maximum: u64,
        interval: Interval,
    },
}

impl LimitOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, LimitOutcome::Pass)
    }
}

/// Check one interval limit for a proposed booking.
///
/// The proposed booking is not part of the count, so the limit fails as soon as
/// `maximum` accepted bookings already exist in the interval.
pub async fn evaluate<C>(
    key: IntervalLimitKey,
    maximum: Option<u64>,
    booking: &ProposedBooking,
    counter: &C,
    resolver: &IntervalResolver,
) -> Result<LimitOutcome, EvaluationFailed>
where
    C: BookingCounter + ?Sized,
{
    let Some(maximum) = maximum else {
        return Ok(LimitOutcome::Pass);
    };

    let interval = resolver.resolve(key, booking.start_time, booking.organizer_timezone);
    let query = BookingCountQuery::accepted(booking.event_type_id, interval);

    trace!(
        event_type_id = booking.event_type_id,
        key = %key,
        range_start = %interval.start,
        range_end = %interval.end,
        "Counting accepted bookings"
    );

    let count = counter
        .count(&query)
        .await
        .map_err(|source| EvaluationFailed::Store { key, source })?;

    if count < maximum {
        return Ok(LimitOutcome::Pass);
    }

    debug!(
        event_type_id = booking.event_type_id,
        key = %key,
        count = count,
        maximum = maximum,
        "Booking limit reached"
    );

    Ok(LimitOutcome::Fail {
        key,
        count,
        maximum,
        interval,
    })
}
