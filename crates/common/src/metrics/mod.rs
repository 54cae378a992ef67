//! Metrics and observability utilities
//!
//! Provides Prometheus-style metrics with standardized naming conventions.
//! Recording is a no-op until a recorder (the gateway's Prometheus exporter)
//! is installed.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// Metrics prefix for all Switchyard metrics
pub const METRICS_PREFIX: &str = "switchyard";

/// Histogram buckets for search and answer latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_source_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Per-source searches by outcome (ok, timeout, error)"
    );

    describe_histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Fan-out search latency in seconds"
    );

    describe_gauge!(
        format!("{}_aggregation_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of merged results returned by the last aggregation"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    describe_counter!(
        format!("{}_embedding_cache_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding cache lookups by result (hit, refreshed, degraded)"
    );

    describe_counter!(
        format!("{}_classifications_total", METRICS_PREFIX),
        Unit::Count,
        "Query classifications by route and deciding rule"
    );

    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Router answers by route, mode and outcome"
    );

    describe_histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end answer latency in seconds"
    );

    describe_counter!(
        format!("{}_harvest_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Harvest job runs by outcome"
    );

    describe_counter!(
        format!("{}_harvested_facts_total", METRICS_PREFIX),
        Unit::Count,
        "Facts appended by the harvest job"
    );

    tracing::info!("Metrics registered");
}

/// Record the outcome of one connector search inside an aggregation
pub fn record_source_search(source: &str, outcome: &str) {
    counter!(
        format!("{}_source_searches_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a completed aggregation
pub fn record_aggregation(duration_secs: f64, result_count: usize) {
    histogram!(format!("{}_aggregation_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_aggregation_results_count", METRICS_PREFIX)).set(result_count as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(batch_size as u64);
    }
}

/// Helper to record embedding cache outcomes
pub fn record_embedding_cache(source: &str, result: &str, count: usize) {
    counter!(
        format!("{}_embedding_cache_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "result" => result.to_string()
    )
    .increment(count as u64);
}

/// Helper to record a classifier decision
pub fn record_classification(route: &str, rule: &str) {
    counter!(
        format!("{}_classifications_total", METRICS_PREFIX),
        "route" => route.to_string(),
        "rule" => rule.to_string()
    )
    .increment(1);
}

/// Helper to record a router answer
pub fn record_answer(duration_secs: f64, route: &str, mode: &str, outcome: &str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "route" => route.to_string(),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        "route" => route.to_string(),
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a harvest run
pub fn record_harvest(outcome: &str, appended: usize) {
    counter!(
        format!("{}_harvest_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(format!("{}_harvested_facts_total", METRICS_PREFIX)).increment(appended as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        register_metrics();
        record_source_search("wiki", "timeout");
        record_answer(0.2, "generalist", "single", "success");
        record_harvest("ok", 3);
        // Just verify it runs without panic
    }
}
