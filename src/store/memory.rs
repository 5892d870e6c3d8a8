//! In-memory booking store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::BookingFixture;
use crate::error::CounterError;
use crate::limits::{BookingCountQuery, BookingCounter, BookingStatus, EventTypeId};

/// A booking held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRecord {
    pub id: Uuid,
    pub event_type_id: EventTypeId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
}

impl BookingRecord {
    /// Create an accepted booking with a fresh id.
    pub fn accepted(event_type_id: EventTypeId, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type_id,
            start_time,
            end_time,
            status: BookingStatus::Accepted,
        }
    }

    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = status;
        self
    }
}

impl From<&BookingFixture> for BookingRecord {
    fn from(fixture: &BookingFixture) -> Self {
        BookingRecord::accepted(fixture.event_type_id, fixture.start_time, fixture.end_time)
            .with_status(fixture.status)
    }
}

/// Bookings grouped by event type.
///
/// This struct is thread-safe and can be shared across multiple tasks.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<EventTypeId, Vec<BookingRecord>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given bookings.
    pub fn with_bookings<I>(records: I) -> Self
    where
        I: IntoIterator<Item = BookingRecord>,
    {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Add a booking.
    pub fn insert(&self, record: BookingRecord) {
        self.bookings
            .write()
            .entry(record.event_type_id)
            .or_default()
            .push(record);
    }

    /// Change the status of a booking. Returns `false` if it does not exist.
    pub fn set_status(&self, id: Uuid, status: BookingStatus) -> bool {
        let mut bookings = self.bookings.write();
        let found = bookings
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|record| record.id == id);

        match found {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Bookings of one event type.
    pub fn bookings_for(&self, event_type_id: EventTypeId) -> Vec<BookingRecord> {
        self.bookings
            .read()
            .get(&event_type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of bookings matching a query, without going through the trait.
    pub fn count_matching(&self, query: &BookingCountQuery) -> u64 {
        self.bookings
            .read()
            .get(&query.event_type_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        query.matches(
                            record.event_type_id,
                            record.status,
                            record.start_time,
                            record.end_time,
                        )
                    })
                    .count() as u64
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl BookingCounter for InMemoryBookingStore {
    async fn count(&self, query: &BookingCountQuery) -> Result<u64, CounterError> {
        Ok(self.count_matching(query))
    }
}
