//! Admission engine for proposed bookings.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::backend::{BookingCounter, EventTypeId};
use super::evaluator::{self, LimitOutcome};
use super::interval::{Interval, IntervalResolver};
use super::key::IntervalLimitKey;
use super::rules::IntervalLimitSet;
use crate::config::AdmissionConfig;
use crate::error::{BookingLimitError, EvaluationFailed, Result};

/// A booking that has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedBooking {
    /// Event type whose limits and bookings apply
    pub event_type_id: EventTypeId,
    /// Start of the booking; selects the intervals checked
    pub start_time: DateTime<Utc>,
    /// End of the booking. Not used for interval selection.
    pub end_time: DateTime<Utc>,
    /// Zone whose calendar defines the intervals
    pub organizer_timezone: Option<Tz>,
}

impl ProposedBooking {
    pub fn new(event_type_id: EventTypeId, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            event_type_id,
            start_time,
            end_time,
            organizer_timezone: None,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.organizer_timezone = Some(timezone);
        self
    }

    /// Set the organizer timezone from an IANA name such as `Europe/Paris`.
    pub fn with_timezone_name(self, name: &str) -> Result<Self> {
        let timezone: Tz = name
            .parse()
            .map_err(|_| BookingLimitError::InvalidTimezone(name.to_string()))?;
        Ok(self.with_timezone(timezone))
    }
}

/// Why a booking was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BookingLimitReached,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BookingLimitReached => "booking_limit_reached",
        }
    }
}

/// Details of the limit that blocked a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Finest violated granularity
    pub key: IntervalLimitKey,
    pub count: u64,
    pub maximum: u64,
    pub interval: Interval,
}

/// Admission decision for a proposed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AdmissionVerdict {
    Admit,
    Reject(Rejection),
}

impl AdmissionVerdict {
    pub fn is_admit(&self) -> bool {
        matches!(self, AdmissionVerdict::Admit)
    }

    /// Convert a rejection into [`BookingLimitError::LimitExceeded`].
    pub fn into_result(self) -> Result<()> {
        match self {
            AdmissionVerdict::Admit => Ok(()),
            AdmissionVerdict::Reject(rejection) => Err(BookingLimitError::LimitExceeded {
                key: rejection.key,
                count: rejection.count,
                maximum: rejection.maximum,
            }),
        }
    }
}

/// Decides whether a proposed booking fits within an event type's limits.
///
/// The engine holds no state between calls. Its verdict is a pre-check only:
/// two concurrent checks can both admit the last free slot. Whatever persists
/// the booking must repeat the check atomically with the insert (see
/// [`BookingLedger`](crate::store::BookingLedger)).
pub struct AdmissionEngine<C: BookingCounter> {
    /// Source of booking counts
    counter: Arc<C>,
    /// Interval boundary computation
    resolver: IntervalResolver,
    /// Deadline for evaluating every limit of one booking
    evaluation_timeout: Option<Duration>,
}

impl<C: BookingCounter> AdmissionEngine<C> {
    /// Create an engine with UTC reference time, Sunday weeks and no deadline.
    pub fn new(counter: Arc<C>) -> Self {
        Self {
            counter,
            resolver: IntervalResolver::default(),
            evaluation_timeout: None,
        }
    }

    /// Create an engine from the admission section of the service config.
    pub fn from_config(counter: Arc<C>, config: &AdmissionConfig) -> Result<Self> {
        Ok(Self::new(counter)
            .with_resolver(config.resolver()?)
            .with_evaluation_timeout(config.evaluation_timeout()))
    }

    pub fn with_resolver(mut self, resolver: IntervalResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = Some(timeout);
        self
    }

    pub fn counter(&self) -> &Arc<C> {
        &self.counter
    }

    pub fn resolver(&self) -> &IntervalResolver {
        &self.resolver
    }

    /// Check a proposed booking against every configured limit.
    ///
    /// All counting queries run concurrently. The reported violation is the
    /// finest violated granularity regardless of which query finished first.
    #[instrument(
        skip(self, limits, booking),
        fields(
            event_type_id = booking.event_type_id,
            start_time = %booking.start_time,
            limit_count = limits.len()
        )
    )]
    pub async fn admit(
        &self,
        limits: &IntervalLimitSet,
        booking: &ProposedBooking,
    ) -> std::result::Result<AdmissionVerdict, EvaluationFailed> {
        let evaluation = self.evaluate_all(limits, booking);

        let result = match self.evaluation_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, evaluation).await {
                Ok(result) => result,
                Err(_) => Err(EvaluationFailed::TimedOut(timeout)),
            },
            None => evaluation.await,
        };

        match &result {
            Ok(verdict) => debug!(verdict = ?verdict, "Booking limits evaluated"),
            Err(e) => warn!(error = %e, "Booking limit evaluation failed"),
        }
        result
    }

    /// Like [`admit`](Self::admit), but gives up when `signal` resolves first.
    ///
    /// Outstanding counting queries are dropped and no partial verdict is
    /// returned.
    pub async fn admit_with_cancel<F>(
        &self,
        limits: &IntervalLimitSet,
        booking: &ProposedBooking,
        signal: F,
    ) -> std::result::Result<AdmissionVerdict, EvaluationFailed>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            verdict = self.admit(limits, booking) => verdict,
            _ = signal => {
                warn!(
                    event_type_id = booking.event_type_id,
                    "Booking limit evaluation cancelled"
                );
                Err(EvaluationFailed::Cancelled)
            }
        }
    }

    /// Check a proposed booking, turning a rejection into an error.
    pub async fn check_booking_limits(
        &self,
        limits: &IntervalLimitSet,
        booking: &ProposedBooking,
    ) -> Result<()> {
        self.admit(limits, booking).await?.into_result()
    }

    async fn evaluate_all(
        &self,
        limits: &IntervalLimitSet,
        booking: &ProposedBooking,
    ) -> std::result::Result<AdmissionVerdict, EvaluationFailed> {
        if limits.is_empty() {
            return Ok(AdmissionVerdict::Admit);
        }

        let counter = self.counter.as_ref();
        let evaluations = limits.iter_ascending().map(|(key, maximum)| {
            evaluator::evaluate(key, Some(maximum), booking, counter, &self.resolver)
        });

        // try_join_all keeps input order, so the first failure is the finest key
        let outcomes = try_join_all(evaluations).await?;

        let rejection = outcomes.into_iter().find_map(|outcome| match outcome {
            LimitOutcome::Pass => None,
            LimitOutcome::Fail {
                key,
                count,
                maximum,
                interval,
            } => Some(Rejection {
                reason: RejectReason::BookingLimitReached,
                key,
                count,
                maximum,
                interval,
            }),
        });

        Ok(rejection.map_or(AdmissionVerdict::Admit, AdmissionVerdict::Reject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CounterError;
    use crate::limits::BookingCountQuery;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    /// Answers by interval length, so each granularity can be given its own count.
    #[derive(Default)]
    struct UnitCounter {
        day: u64,
        week: u64,
        month: u64,
        year: u64,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl BookingCounter for UnitCounter {
        async fn count(&self, query: &BookingCountQuery) -> std::result::Result<u64, CounterError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let days = (query.range_end - query.range_start).num_days();
            Ok(match days {
                0 => self.day,
                1..=7 => self.week,
                8..=31 => self.month,
                _ => self.year,
            })
        }
    }

    /// Fails queries for one granularity only.
    struct PartialOutage;

    #[async_trait]
    impl BookingCounter for PartialOutage {
        async fn count(&self, query: &BookingCountQuery) -> std::result::Result<u64, CounterError> {
            if (query.range_end - query.range_start).num_days() > 31 {
                return Err(CounterError::Query("statement timeout".into()));
            }
            Ok(0)
        }
    }

    /// Never answers within a test's lifetime.
    #[derive(Default)]
    struct SlowCounter {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl BookingCounter for SlowCounter {
        async fn count(&self, _query: &BookingCountQuery) -> std::result::Result<u64, CounterError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    /// Only answers once every configured limit is being queried at once.
    struct RendezvousCounter {
        barrier: Barrier,
    }

    #[async_trait]
    impl BookingCounter for RendezvousCounter {
        async fn count(&self, _query: &BookingCountQuery) -> std::result::Result<u64, CounterError> {
            self.barrier.wait().await;
            Ok(0)
        }
    }

    fn march_first() -> ProposedBooking {
        let start = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ProposedBooking::new(7, start, start + chrono::Duration::minutes(30))
    }

    fn limits(json: &str) -> IntervalLimitSet {
        IntervalLimitSet::from_json(json).unwrap()
    }

    fn rejected_key(verdict: &AdmissionVerdict) -> Option<IntervalLimitKey> {
        match verdict {
            AdmissionVerdict::Reject(rejection) => Some(rejection.key),
            AdmissionVerdict::Admit => None,
        }
    }

    #[tokio::test]
    async fn test_no_limits_always_admits() {
        let counter = Arc::new(UnitCounter {
            day: 1000,
            week: 1000,
            month: 1000,
            year: 1000,
            ..Default::default()
        });
        let engine = AdmissionEngine::new(counter.clone());

        let verdict = engine.admit(&IntervalLimitSet::new(), &march_first()).await.unwrap();
        assert_eq!(verdict, AdmissionVerdict::Admit);
        assert_eq!(counter.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_daily_limit_reached() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 2,
            ..Default::default()
        }));

        let verdict = engine.admit(&limits(r#"{"PER_DAY": 2}"#), &march_first()).await.unwrap();
        match verdict {
            AdmissionVerdict::Reject(rejection) => {
                assert_eq!(rejection.key, IntervalLimitKey::PerDay);
                assert_eq!(rejection.reason.as_str(), "booking_limit_reached");
                assert_eq!(rejection.count, 2);
                assert_eq!(rejection.maximum, 2);
            }
            AdmissionVerdict::Admit => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_daily_limit_with_room() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 1,
            ..Default::default()
        }));

        let verdict = engine.admit(&limits(r#"{"PER_DAY": 2}"#), &march_first()).await.unwrap();
        assert!(verdict.is_admit());
    }

    #[tokio::test]
    async fn test_coarser_limit_rejects_when_finer_pass() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 0,
            week: 1,
            month: 10,
            year: 10,
            ..Default::default()
        }));

        let verdict = engine
            .admit(
                &limits(r#"{"PER_DAY": 3, "PER_WEEK": 5, "PER_MONTH": 10}"#),
                &march_first(),
            )
            .await
            .unwrap();
        assert_eq!(rejected_key(&verdict), Some(IntervalLimitKey::PerMonth));
    }

    #[tokio::test]
    async fn test_finest_violation_is_reported() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 4,
            week: 4,
            month: 4,
            year: 4,
            ..Default::default()
        }));

        let verdict = engine
            .admit(&limits(r#"{"PER_YEAR": 4, "PER_WEEK": 4, "PER_DAY": 9}"#), &march_first())
            .await
            .unwrap();
        assert_eq!(rejected_key(&verdict), Some(IntervalLimitKey::PerWeek));
    }

    #[tokio::test]
    async fn test_all_limits_pass() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 1,
            week: 2,
            month: 3,
            year: 4,
            ..Default::default()
        }));

        let verdict = engine
            .admit(
                &limits(r#"{"PER_DAY": 2, "PER_WEEK": 3, "PER_MONTH": 4, "PER_YEAR": 5}"#),
                &march_first(),
            )
            .await
            .unwrap();
        assert!(verdict.is_admit());
    }

    #[tokio::test]
    async fn test_verdict_is_idempotent() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 1,
            month: 7,
            ..Default::default()
        }));
        let limits = limits(r#"{"PER_DAY": 5, "PER_MONTH": 7}"#);

        let first = engine.admit(&limits, &march_first()).await.unwrap();
        let second = engine.admit(&limits, &march_first()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rejected_key(&first), Some(IntervalLimitKey::PerMonth));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_admit() {
        let engine = AdmissionEngine::new(Arc::new(PartialOutage));

        let err = engine
            .admit(&limits(r#"{"PER_DAY": 2, "PER_YEAR": 100}"#), &march_first())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationFailed::Store {
                key: IntervalLimitKey::PerYear,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_queries_run_concurrently() {
        let engine = AdmissionEngine::new(Arc::new(RendezvousCounter {
            barrier: Barrier::new(4),
        }))
        .with_evaluation_timeout(Duration::from_secs(2));

        let verdict = engine
            .admit(
                &limits(r#"{"PER_DAY": 1, "PER_WEEK": 1, "PER_MONTH": 1, "PER_YEAR": 1}"#),
                &march_first(),
            )
            .await
            .unwrap();
        assert!(verdict.is_admit());
    }

    #[tokio::test]
    async fn test_timeout_yields_evaluation_failure() {
        let engine = AdmissionEngine::new(Arc::new(SlowCounter::default()))
            .with_evaluation_timeout(Duration::from_millis(20));

        let err = engine
            .admit(&limits(r#"{"PER_DAY": 1}"#), &march_first())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationFailed::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_cancel_drops_outstanding_queries() {
        let counter = Arc::new(SlowCounter::default());
        let engine = AdmissionEngine::new(counter.clone());

        let err = engine
            .admit_with_cancel(
                &limits(r#"{"PER_DAY": 1, "PER_MONTH": 3}"#),
                &march_first(),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationFailed::Cancelled));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_signal_after_verdict_is_ignored() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter::default()));

        let verdict = engine
            .admit_with_cancel(
                &limits(r#"{"PER_DAY": 1}"#),
                &march_first(),
                std::future::pending::<()>(),
            )
            .await
            .unwrap();
        assert!(verdict.is_admit());
    }

    #[tokio::test]
    async fn test_concurrent_checks_both_admit_last_slot() {
        // The engine is a pre-check: it does not serialize concurrent callers.
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            day: 2,
            ..Default::default()
        }));
        let limits = limits(r#"{"PER_DAY": 3}"#);
        let booking = march_first();

        let (first, second) = tokio::join!(
            engine.admit(&limits, &booking),
            engine.admit(&limits, &booking)
        );
        assert!(first.unwrap().is_admit());
        assert!(second.unwrap().is_admit());
    }

    #[tokio::test]
    async fn test_check_booking_limits_maps_rejection() {
        let engine = AdmissionEngine::new(Arc::new(UnitCounter {
            week: 5,
            ..Default::default()
        }));

        let err = engine
            .check_booking_limits(&limits(r#"{"PER_WEEK": 5}"#), &march_first())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingLimitError::LimitExceeded {
                key: IntervalLimitKey::PerWeek,
                count: 5,
                maximum: 5
            }
        ));
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn test_unknown_timezone_name() {
        let err = march_first().with_timezone_name("Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(err, BookingLimitError::InvalidTimezone(_)));

        let booking = march_first().with_timezone_name("Asia/Tokyo").unwrap();
        assert_eq!(booking.organizer_timezone, Some(chrono_tz::Asia::Tokyo));
    }
}
