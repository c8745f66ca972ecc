//! # Internal Metrics Module
//!
//! Counters and gauges describing the bridge's own activity. They are recorded
//! through the `metrics` facade; when `log_metrics` is enabled a
//! [`LoggingRecorder`] is installed globally and prints a snapshot
//! periodically. Otherwise the facade's no-op recorder swallows them.

use metrics::Unit;

pub mod logging_recorder;

pub use logging_recorder::LoggingRecorder;

pub const POLLS_TOTAL: &str = "polls_total";
pub const SAMPLES_TOTAL: &str = "samples_total";
pub const MISSING_DATUM_TOTAL: &str = "missing_datum_total";
pub const MALFORMED_RESPONSE_TOTAL: &str = "malformed_response_total";
pub const UPSTREAM_ERRORS_TOTAL: &str = "upstream_errors_total";
pub const POINTS_WRITTEN_TOTAL: &str = "points_written_total";
pub const WRITE_ERRORS_TOTAL: &str = "write_errors_total";
pub const LIVE_WORKERS: &str = "live_workers";

/// Registers descriptions for every metric with the global recorder.
pub fn describe() {
    metrics::describe_counter!(POLLS_TOTAL, Unit::Count, "Telemetry queries issued, one per server and cycle.");
    metrics::describe_counter!(SAMPLES_TOTAL, Unit::Count, "Power samples successfully extracted from telemetry responses.");
    metrics::describe_counter!(MISSING_DATUM_TOTAL, Unit::Count, "Queries that returned no measurement for the window.");
    metrics::describe_counter!(MALFORMED_RESPONSE_TOTAL, Unit::Count, "Queries whose response lacked an expected field.");
    metrics::describe_counter!(UPSTREAM_ERRORS_TOTAL, Unit::Count, "Queries that failed at the HTTP level.");
    metrics::describe_counter!(POINTS_WRITTEN_TOTAL, Unit::Count, "Points acknowledged by the time-series database.");
    metrics::describe_counter!(WRITE_ERRORS_TOTAL, Unit::Count, "Points the time-series database rejected.");
    metrics::describe_gauge!(LIVE_WORKERS, Unit::Count, "Domain workers that have not terminated.");
}
