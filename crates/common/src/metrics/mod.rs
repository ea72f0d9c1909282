//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// Metrics prefix for all DocMind metrics
pub const METRICS_PREFIX: &str = "docmind";

/// SLO-aligned histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
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

/// Buckets for upstream model calls (embedding, completion)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Query pipeline metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total queries processed, labeled by outcome"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query pipeline latency in seconds"
    );

    // Memory metrics
    describe_counter!(
        format!("{}_memory_lookups_total", METRICS_PREFIX),
        Unit::Count,
        "Memory lookups, labeled by result (exact_hit, similar_hit, miss)"
    );

    describe_counter!(
        format!("{}_memory_entries_stored_total", METRICS_PREFIX),
        Unit::Count,
        "New memory entries admitted to the cache"
    );

    // Retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds, labeled by method"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from retrieval"
    );

    // Embedding metrics
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

    // Synthesis metrics
    describe_histogram!(
        format!("{}_synthesis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer synthesis latency in seconds"
    );

    describe_counter!(
        format!("{}_citation_violations_total", METRICS_PREFIX),
        Unit::Count,
        "Citations outside the provided context, labeled by resolution"
    );

    // Admission metrics
    describe_counter!(
        format!("{}_admission_outcomes_total", METRICS_PREFIX),
        Unit::Count,
        "Admission decisions for concurrent identical queries"
    );

    // Feedback and evaluation metrics
    describe_counter!(
        format!("{}_feedback_updates_total", METRICS_PREFIX),
        Unit::Count,
        "Feedback writes, labeled by action"
    );

    describe_counter!(
        format!("{}_judgments_recorded_total", METRICS_PREFIX),
        Unit::Count,
        "Relevance judgments recorded, labeled by method"
    );

    tracing::info!("Metrics registered");
}

/// Record an HTTP request outcome
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        "method" => method.to_string(),
        "endpoint" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        "method" => method.to_string(),
        "endpoint" => path.to_string()
    )
    .record(duration_secs);
}

/// Record a completed query pipeline run
pub fn record_query(outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Record a memory lookup result
pub fn record_memory_lookup(result: &str) {
    counter!(
        format!("{}_memory_lookups_total", METRICS_PREFIX),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a memory store attempt
pub fn record_memory_store(created: bool) {
    if created {
        counter!(format!("{}_memory_entries_stored_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record retrieval metrics for one method
pub fn record_retrieval(method: &str, duration_secs: f64, result_count: usize) {
    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "method" => method.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "method" => method.to_string()
    )
    .set(result_count as f64);
}

/// Record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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
        .increment(1);
    }
}

/// Record answer synthesis metrics
pub fn record_synthesis(duration_secs: f64, model: &str) {
    histogram!(
        format!("{}_synthesis_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record a citation-contract violation and how it was resolved
pub fn record_citation_violation(resolution: &str) {
    counter!(
        format!("{}_citation_violations_total", METRICS_PREFIX),
        "resolution" => resolution.to_string()
    )
    .increment(1);
}

/// Record an admission decision for a concurrent identical query
pub fn record_admission(policy: &str, leader: bool) {
    let role = if leader { "leader" } else { "follower" };
    counter!(
        format!("{}_admission_outcomes_total", METRICS_PREFIX),
        "policy" => policy.to_string(),
        "role" => role.to_string()
    )
    .increment(1);
}

/// Record a feedback write
pub fn record_feedback(action: &str) {
    counter!(
        format!("{}_feedback_updates_total", METRICS_PREFIX),
        "action" => action.to_string()
    )
    .increment(1);
}

/// Record relevance judgments persisted for one retrieval method
pub fn record_judgments(method: &str, count: usize) {
    if count > 0 {
        counter!(
            format!("{}_judgments_recorded_total", METRICS_PREFIX),
            "method" => method.to_string()
        )
        .increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        let mut prev = 0.0;
        for &bucket in UPSTREAM_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        register_metrics();
        record_query("memory_hit", 0.012);
        record_memory_lookup("exact_hit");
        record_memory_store(true);
        record_retrieval("vector", 0.050, 5);
        record_embedding(0.2, "mock-embedding", true);
        record_synthesis(1.5, "mock-completion");
        record_citation_violation("stripped");
        record_admission("serialize", false);
        record_feedback("saved");
        record_judgments("fused", 5);
        record_http_request("POST", "/api/query", 200, 0.4);
    }
}
