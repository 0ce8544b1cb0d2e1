//! Prometheus metrics for the publish pipeline
//!
//! Exposed by the server on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::model::{Platform, PlatformStatus};

lazy_static! {
    /// Counter: platform publish outcomes
    pub static ref PLATFORM_PUBLISH: CounterVec = register_counter_vec!(
        "statusrelay_platform_publish_total",
        "Platform publish attempts by resulting status",
        &["platform", "outcome"]
    )
    .expect("Failed to create platform_publish metric");

    /// Histogram: time spent publishing to one platform (seconds)
    pub static ref PUBLISH_DURATION: HistogramVec = register_histogram_vec!(
        "statusrelay_publish_duration_seconds",
        "Duration of a single platform publish",
        &["platform"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("Failed to create publish_duration metric");

    /// Counter: individual Jira worklog POSTs
    pub static ref WORKLOG_ATTEMPTS: CounterVec = register_counter_vec!(
        "statusrelay_worklog_attempts_total",
        "Jira worklog POST attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to create worklog_attempts metric");
}

/// Record the status a platform ended in after a publish
pub fn record_publish(platform: Platform, status: PlatformStatus) {
    PLATFORM_PUBLISH
        .with_label_values(&[platform.as_str(), status.as_str()])
        .inc();
}

pub fn record_publish_duration(platform: Platform, duration_secs: f64) {
    PUBLISH_DURATION
        .with_label_values(&[platform.as_str()])
        .observe(duration_secs);
}

/// Record one worklog POST (`success`, `transient` or `rejected`)
pub fn record_worklog_attempt(outcome: &str) {
    WORKLOG_ATTEMPTS.with_label_values(&[outcome]).inc();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
