//! Prometheus metrics for one export activity (spec §10.5). The registry is
//! constructed and updated here; scraping/serving it over HTTP is the host
//! process's responsibility and is out of scope for this crate.

pub use prometheus;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static::lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(
        Some("pgexport".to_string()),
        None,
    ).unwrap();

    pub static ref ROWS_EXPORTED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("rows_exported_total", "Rows written to the destination across all flushes.")
    )
    .unwrap();

    pub static ref BYTES_EXPORTED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("bytes_exported_total", "Sanitized bytes written to the destination via COPY.")
    )
    .unwrap();

    pub static ref QUEUE_BYTES: IntGauge = IntGauge::with_opts(
        Opts::new("queue_bytes", "Current cumulative bytes held in the record-batch queue.")
    )
    .unwrap();

    pub static ref FLUSH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "flush_duration_seconds",
            "Wall time of one consumer flush cycle (rewind, COPY, heartbeat update).",
        )
    )
    .unwrap();

    pub static ref ACTIVITY_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("activity_errors_total", "Activity errors by kind."),
        &["kind"],
    )
    .unwrap();
}

/// Registers every metric above with [`REGISTRY`]. Idempotent to call more
/// than once is not guaranteed by `prometheus::Registry` (a duplicate
/// registration errors), so callers should invoke this exactly once per
/// process, typically from the binary's startup path.
pub fn register_all() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(ROWS_EXPORTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BYTES_EXPORTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_BYTES.clone()))?;
    REGISTRY.register(Box::new(FLUSH_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ACTIVITY_ERRORS_TOTAL.clone()))?;
    Ok(())
}
