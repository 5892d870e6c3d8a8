//! Booking Limits - interval capacity checks for scheduled event types
//!
//! An event type may cap how many accepted bookings fall inside a calendar
//! day, week, month or year. This crate parses those caps, resolves the
//! calendar intervals in the organizer's timezone, and decides whether a
//! proposed booking may be created. The decision is a read-only pre-check;
//! [`store::BookingLedger`] shows the atomic commit path that must back it.

pub mod config;
pub mod error;
pub mod limits;
pub mod store;

pub use error::{BookingLimitError, CounterError, EvaluationFailed, Result};
pub use limits::{
    AdmissionEngine, AdmissionVerdict, BookingCounter, IntervalLimitKey, IntervalLimitSet,
    ProposedBooking,
};
