//! Metrics utilities
//!
//! Prometheus metric descriptions and recording helpers with
//! standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all TacForge metrics
pub const METRICS_PREFIX: &str = "tacforge";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_tasks_extracted_total", METRICS_PREFIX),
        Unit::Count,
        "Total tactical tasks extracted and stored"
    );

    describe_counter!(
        format!("{}_extraction_candidates_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Extraction candidates dropped by validation"
    );

    describe_counter!(
        format!("{}_extraction_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Extraction units that produced no parseable reply"
    );

    describe_counter!(
        format!("{}_recognition_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total recognition runs"
    );

    describe_histogram!(
        format!("{}_recognition_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Recognition run latency in seconds"
    );

    describe_counter!(
        format!("{}_mentions_resolved_total", METRICS_PREFIX),
        Unit::Count,
        "Recognized mentions resolved against the knowledge store"
    );

    describe_counter!(
        format!("{}_mentions_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Recognized mentions dropped (invalid or unresolved)"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding calls that degraded to a zero vector"
    );

    describe_counter!(
        format!("{}_analysis_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Background analysis jobs processed"
    );

    describe_counter!(
        format!("{}_analysis_persist_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Analysis results that could not be persisted after retry"
    );

    tracing::info!("Metrics registered");
}

/// Record a completed recognition run
pub fn record_recognition(duration_secs: f64, resolved: usize, dropped: usize) {
    counter!(format!("{}_recognition_requests_total", METRICS_PREFIX)).increment(1);
    histogram!(format!("{}_recognition_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    counter!(format!("{}_mentions_resolved_total", METRICS_PREFIX)).increment(resolved as u64);
    counter!(format!("{}_mentions_dropped_total", METRICS_PREFIX)).increment(dropped as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_record_run_without_panic() {
        register_metrics();
        record_recognition(0.05, 2, 1);
    }
}
