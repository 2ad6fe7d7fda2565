//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the guardrail pipeline, the query router,
//! and every external call, with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all sqlrag metrics
pub const METRICS_PREFIX: &str = "sqlrag";

/// Histogram buckets for request latency (in seconds).
/// Answers involve several model calls, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 120s
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

    // Guardrail metrics
    describe_counter!(
        format!("{}_guardrail_terminations_total", METRICS_PREFIX),
        Unit::Count,
        "Requests or answers replaced by a guardrail stage"
    );

    describe_counter!(
        format!("{}_safety_check_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Safety checks that failed closed because the model call failed or was ambiguous"
    );

    // Router metrics
    describe_counter!(
        format!("{}_router_routes_total", METRICS_PREFIX),
        Unit::Count,
        "Questions routed to each answering branch"
    );

    describe_counter!(
        format!("{}_classifier_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Classifier outputs that matched neither expected token"
    );

    describe_counter!(
        format!("{}_queries_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Generated queries rejected by read-only validation"
    );

    describe_counter!(
        format!("{}_query_execution_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Validated queries that failed in the structured store"
    );

    // External call metrics
    describe_histogram!(
        format!("{}_external_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of calls to the model, embedding, index and store"
    );

    describe_counter!(
        format!("{}_external_call_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "External calls that exceeded their deadline"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// A guardrail stage terminated a phase
pub fn record_guardrail_termination(stage: &str, phase: &str) {
    counter!(
        format!("{}_guardrail_terminations_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// The safety stage could not get a usable verdict
pub fn record_safety_failure(reason: &str) {
    counter!(
        format!("{}_safety_check_failures_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// The router picked an answering branch
pub fn record_route(route: &str) {
    counter!(
        format!("{}_router_routes_total", METRICS_PREFIX),
        "route" => route.to_string()
    )
    .increment(1);
}

pub fn record_classifier_fallback() {
    counter!(format!("{}_classifier_fallbacks_total", METRICS_PREFIX)).increment(1);
}

pub fn record_query_rejected() {
    counter!(format!("{}_queries_rejected_total", METRICS_PREFIX)).increment(1);
}

pub fn record_query_failure() {
    counter!(format!("{}_query_execution_failures_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record one external call
pub fn record_external_call(service: &str, duration_secs: f64, timed_out: bool) {
    histogram!(
        format!("{}_external_call_duration_seconds", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .record(duration_secs);

    if timed_out {
        counter!(
            format!("{}_external_call_timeouts_total", METRICS_PREFIX),
            "service" => service.to_string()
        )
        .increment(1);
    }
}
