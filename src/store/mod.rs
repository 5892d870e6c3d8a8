//! Booking storage and the atomic commit path.

mod ledger;
mod memory;

pub use ledger::{BookingLedger, CommitOutcome, IntervalLockKey};
pub use memory::{BookingRecord, InMemoryBookingStore};
