// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the acmedns controller.
//!
//! All metrics carry the `acmedns` prefix and are registered in
//! [`METRICS_REGISTRY`], which is served on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Certificate Metrics** - Certificate requests by kind and outcome, flow duration
//! - **Reconciliation Metrics** - Passes per namespace, active namespaces
//! - **Error Metrics** - Failures by error category

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

use crate::errors::Error;

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "acmedns";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Certificate Metrics
// ============================================================================

/// Total number of certificate requests by kind and outcome
///
/// Labels:
/// - `kind`: `new` or `renew`
/// - `status`: `success` or `error`
pub static CERTIFICATE_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_certificate_requests_total"),
        "Total number of certificate requests by kind and status",
    );
    let counter = CounterVec::new(opts, &["kind", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of certificate flows in seconds, from request to stored secret
///
/// Labels:
/// - `kind`: `new` or `renew`
pub static CERTIFICATE_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_certificate_request_duration_seconds"),
        "Duration of certificate flows in seconds by kind",
    )
    .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]);
    let histogram = HistogramVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliation passes by status
///
/// Labels:
/// - `status`: `success` or `error`
pub static RECONCILIATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of namespace reconciliation passes by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of namespaces with an active reconciliation schedule
pub static ACTIVE_NAMESPACES: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_active_namespaces"),
        "Number of namespaces with an active reconciliation schedule",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by category
///
/// Labels:
/// - `category`: see [`Error::category`]
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by category",
    );
    let counter = CounterVec::new(opts, &["category"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Label for a certificate request kind.
#[must_use]
pub fn request_kind(renew: bool) -> &'static str {
    if renew {
        "renew"
    } else {
        "new"
    }
}

/// Record a certificate stored in its secret
pub fn record_certificate_success(renew: bool, duration: Duration) {
    let kind = request_kind(renew);
    CERTIFICATE_REQUESTS_TOTAL
        .with_label_values(&[kind, "success"])
        .inc();
    CERTIFICATE_REQUEST_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// Record a failed certificate flow
pub fn record_certificate_error(renew: bool, duration: Duration, error: &Error) {
    let kind = request_kind(renew);
    CERTIFICATE_REQUESTS_TOTAL
        .with_label_values(&[kind, "error"])
        .inc();
    CERTIFICATE_REQUEST_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
    record_error(error);
}

/// Record a reconciliation pass
pub fn record_reconciliation(success: bool) {
    let status = if success { "success" } else { "error" };
    RECONCILIATIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Record an error by its category
pub fn record_error(error: &Error) {
    ERRORS_TOTAL.with_label_values(&[error.category()]).inc();
}

/// Set the number of namespaces with an active schedule
#[allow(clippy::cast_precision_loss)]
pub fn set_active_namespaces(count: usize) {
    ACTIVE_NAMESPACES.set(count as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_certificate_success() {
        record_certificate_success(true, Duration::from_secs(42));

        let counter = CERTIFICATE_REQUESTS_TOTAL.with_label_values(&["renew", "success"]);
        assert!(counter.get() > 0.0);

        let histogram = CERTIFICATE_REQUEST_DURATION_SECONDS.with_label_values(&["renew"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_certificate_error_counts_category() {
        record_certificate_error(false, Duration::from_secs(3), &Error::NoDomains);

        let counter = CERTIFICATE_REQUESTS_TOTAL.with_label_values(&["new", "error"]);
        assert!(counter.get() > 0.0);
        assert!(ERRORS_TOTAL.with_label_values(&["annotation"]).get() > 0.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation(true);

        let metrics_text = gather_metrics().unwrap();
        assert!(
            metrics_text.contains("acmedns_reconciliations_total"),
            "Metrics should contain reconciliation counter"
        );
    }
}
