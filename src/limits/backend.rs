//! Booking counter trait for abstracting the booking store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::interval::Interval;
use crate::error::CounterError;

/// Identifier of an event type.
pub type EventTypeId = u64;

/// Lifecycle state of a stored booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Accepted,
    Pending,
    Cancelled,
    Rejected,
}

/// Count of bookings for one event type inside one interval.
///
/// A booking matches when its status equals `status`, it starts at or after
/// `range_start` and it ends at or before `range_end`. Bookings that straddle
/// either boundary are not counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BookingCountQuery {
    pub event_type_id: EventTypeId,
    pub status: BookingStatus,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
}

impl BookingCountQuery {
    /// Query for accepted bookings inside `interval`.
    pub fn accepted(event_type_id: EventTypeId, interval: Interval) -> Self {
        Self {
            event_type_id,
            status: BookingStatus::Accepted,
            range_start: interval.start,
            range_end: interval.end,
        }
    }

    /// Whether a booking with these attributes is counted by this query.
    pub fn matches(
        &self,
        event_type_id: EventTypeId,
        status: BookingStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        self.event_type_id == event_type_id
            && self.status == status
            && start >= self.range_start
            && end <= self.range_end
    }
}

/// Read-only access to booking counts.
///
/// Implementations must tolerate concurrent calls; the admission engine issues
/// one query per configured limit at the same time.
#[async_trait]
pub trait BookingCounter: Send + Sync {
    /// Count the bookings matching `query`.
    async fn count(&self, query: &BookingCountQuery) -> Result<u64, CounterError>;
}

#[async_trait]
impl<C: BookingCounter + ?Sized> BookingCounter for Arc<C> {
    async fn count(&self, query: &BookingCountQuery) -> Result<u64, CounterError> {
        (**self).count(query).await
    }
}
