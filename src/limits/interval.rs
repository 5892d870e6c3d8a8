//! Calendar interval resolution.
//!
//! Boundaries are computed on the local calendar of a timezone and returned as
//! absolute instants, so a store can compare them against booking times without
//! knowing anything about zones.

use chrono::{
    DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;

use super::key::{IntervalLimitKey, IntervalUnit};

/// An inclusive range of instants covering one calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    /// First instant of the unit
    pub start: DateTime<Utc>,
    /// Last millisecond of the unit
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Whether `instant` falls inside this interval.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Maps a limit key and an instant to the calendar interval containing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalResolver {
    /// Zone used when the organizer has none
    reference_timezone: Tz,
    /// First day of a calendar week
    week_start: Weekday,
}

impl Default for IntervalResolver {
    fn default() -> Self {
        Self {
            reference_timezone: Tz::UTC,
            week_start: Weekday::Sun,
        }
    }
}

impl IntervalResolver {
    /// Create a resolver with the given fallback zone and first weekday.
    pub fn new(reference_timezone: Tz, week_start: Weekday) -> Self {
        Self {
            reference_timezone,
            week_start,
        }
    }

    pub fn reference_timezone(&self) -> Tz {
        self.reference_timezone
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Resolve the interval of `key`'s unit that contains `instant`.
    ///
    /// The end is the start of the following unit minus one millisecond.
    pub fn resolve(
        &self,
        key: IntervalLimitKey,
        instant: DateTime<Utc>,
        timezone: Option<Tz>,
    ) -> Interval {
        let tz = timezone.unwrap_or(self.reference_timezone);
        let local_date = instant.with_timezone(&tz).date_naive();
        let (first_day, next_first_day) = self.unit_days(key.unit(), local_date);

        Interval {
            start: start_of_day(tz, first_day),
            end: start_of_day(tz, next_first_day) - chrono::Duration::milliseconds(1),
        }
    }

    /// First local date of the unit containing `date`, and of the unit after it.
    fn unit_days(&self, unit: IntervalUnit, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match unit {
            IntervalUnit::Day => (date, date + Days::new(1)),
            IntervalUnit::Week => {
                let offset = (7 + date.weekday().num_days_from_monday()
                    - self.week_start.num_days_from_monday())
                    % 7;
                let first = date - Days::new(u64::from(offset));
                (first, first + Days::new(7))
            }
            IntervalUnit::Month => {
                let first = date - Days::new(u64::from(date.day0()));
                (first, first + Months::new(1))
            }
            IntervalUnit::Year => {
                let first = date - Days::new(u64::from(date.ordinal0()));
                (first, first + Months::new(12))
            }
        }
    }
}

/// The first instant of `date` in `tz`.
///
/// An ambiguous midnight resolves to the earlier instant. A midnight skipped by
/// a DST gap resolves to the transition itself, the first valid local time.
fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset_before = tz
                .offset_from_utc_datetime(&(midnight - chrono::Duration::days(1)))
                .fix();
            let transition =
                midnight - chrono::Duration::seconds(i64::from(offset_before.local_minus_utc()));
            Utc.from_utc_datetime(&transition)
        }
    }
}
