use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use booking_limits::config::BookingLimitsConfig;
use booking_limits::limits::{AdmissionEngine, EventTypeId, ProposedBooking};
use booking_limits::store::{BookingLedger, BookingRecord, InMemoryBookingStore};

/// Check a proposed booking against an event type's interval limits.
#[derive(Parser, Debug)]
#[command(name = "booking-limits", version, about)]
struct Args {
    /// YAML file with admission settings, event types and existing bookings
    #[arg(short, long)]
    config: PathBuf,

    /// Event type the booking is for
    #[arg(short, long)]
    event_type: EventTypeId,

    /// Booking start (RFC 3339)
    #[arg(long)]
    start: DateTime<Utc>,

    /// Booking end (RFC 3339)
    #[arg(long)]
    end: DateTime<Utc>,

    /// Organizer timezone (IANA name)
    #[arg(long)]
    timezone: Option<String>,

    /// Commit the booking to the in-memory store after checking
    #[arg(long)]
    commit: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = BookingLimitsConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let limits = config
        .event_limit_sets()?
        .remove(&args.event_type)
        .with_context(|| format!("event type {} is not configured", args.event_type))?;
    info!(
        event_type_id = args.event_type,
        limits = %serde_json::to_string(&limits)?,
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryBookingStore::with_bookings(
        config.bookings.iter().map(BookingRecord::from),
    ));
    let engine = AdmissionEngine::from_config(store, &config.admission)?;

    let mut booking = ProposedBooking::new(args.event_type, args.start, args.end);
    if let Some(timezone) = &args.timezone {
        booking = booking.with_timezone_name(timezone)?;
    }

    let admitted = if args.commit {
        let ledger = BookingLedger::new(engine);
        let outcome = ledger.commit(&limits, &booking).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        outcome.is_committed()
    } else {
        let verdict = engine.admit(&limits, &booking).await?;
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        verdict.is_admit()
    };

    Ok(if admitted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
