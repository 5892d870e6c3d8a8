//! Interval booking limits and admission logic.

mod backend;
mod engine;
mod evaluator;
mod interval;
mod key;
mod rules;

pub use backend::{BookingCountQuery, BookingCounter, BookingStatus, EventTypeId};
pub use engine::{AdmissionEngine, AdmissionVerdict, ProposedBooking, RejectReason, Rejection};
pub use evaluator::{evaluate, LimitOutcome};
pub use interval::{Interval, IntervalResolver};
pub use key::{IntervalLimitKey, IntervalUnit, ASCENDING_LIMIT_KEYS};
pub use rules::IntervalLimitSet;
