//! Atomic check-and-insert of admitted bookings.
//!
//! The admission engine reads counts and decides; on its own it cannot stop two
//! concurrent requests from both taking the last slot of an interval. The
//! ledger serializes commits per `(event type, limit key, interval start)`
//! and repeats the admission check while holding those locks, so the check and
//! the insert happen as one step for everyone touching the same intervals.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::memory::{BookingRecord, InMemoryBookingStore};
use crate::error::EvaluationFailed;
use crate::limits::{
    AdmissionEngine, AdmissionVerdict, EventTypeId, IntervalLimitKey, IntervalLimitSet,
    ProposedBooking, Rejection,
};

/// Advisory lock identity for one limited interval.
pub type IntervalLockKey = (EventTypeId, IntervalLimitKey, DateTime<Utc>);

/// Result of trying to persist a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed(BookingRecord),
    Rejected(Rejection),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Persists bookings only when they still fit within their limits.
pub struct BookingLedger {
    engine: AdmissionEngine<InMemoryBookingStore>,
    locks: DashMap<IntervalLockKey, Arc<Mutex<()>>>,
}

impl BookingLedger {
    /// Create a ledger writing to the store the engine counts from.
    pub fn new(engine: AdmissionEngine<InMemoryBookingStore>) -> Self {
        Self {
            engine,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<InMemoryBookingStore> {
        self.engine.counter()
    }

    pub fn engine(&self) -> &AdmissionEngine<InMemoryBookingStore> {
        &self.engine
    }

    /// Number of interval locks currently tracked.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Re-check the limits and insert the booking if it is still admitted.
    #[instrument(
        skip(self, limits, booking),
        fields(event_type_id = booking.event_type_id, start_time = %booking.start_time)
    )]
    pub async fn commit(
        &self,
        limits: &IntervalLimitSet,
        booking: &ProposedBooking,
    ) -> Result<CommitOutcome, EvaluationFailed> {
        let keys = self.lock_keys(limits, booking);

        // Always acquired in ascending key order, so committers cannot deadlock
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = Arc::clone(&self.locks.entry(*key).or_default());
            guards.push(lock.lock_owned().await);
        }

        let outcome = match self.engine.admit(limits, booking).await {
            Ok(AdmissionVerdict::Admit) => {
                let record =
                    BookingRecord::accepted(booking.event_type_id, booking.start_time, booking.end_time);
                self.store().insert(record.clone());
                info!(booking_id = %record.id, "Booking committed");
                Ok(CommitOutcome::Committed(record))
            }
            Ok(AdmissionVerdict::Reject(rejection)) => {
                debug!(key = %rejection.key, "Booking rejected at commit");
                Ok(CommitOutcome::Rejected(rejection))
            }
            Err(e) => Err(e),
        };

        drop(guards);
        for key in &keys {
            self.locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }

        outcome
    }

    fn lock_keys(&self, limits: &IntervalLimitSet, booking: &ProposedBooking) -> Vec<IntervalLockKey> {
        let resolver = self.engine.resolver();
        limits
            .iter_ascending()
            .map(|(key, _)| {
                let interval = resolver.resolve(key, booking.start_time, booking.organizer_timezone);
                (booking.event_type_id, key, interval.start)
            })
            .collect()
    }
}
