//! Prometheus metrics for the kennel server.
//!
//! Exposes counters for prune runs and dog exports, plus authentication
//! failures.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry bucket names but no object paths or dog identifiers.
//! Restrict the endpoint to the scraper's network at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Prune metrics
pub static PRUNE_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("kennel_prune_runs_total", "Total prune runs by mode"),
        &["mode"],
    )
    .expect("metric creation failed")
});

pub static PRUNE_OBJECTS_EXAMINED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kennel_prune_objects_examined_total",
        "Total storage objects examined by prune runs",
    )
    .expect("metric creation failed")
});

pub static PRUNE_ORPHANS_FOUND: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kennel_prune_orphans_found_total",
            "Total unreferenced storage objects found, by bucket",
        ),
        &["bucket"],
    )
    .expect("metric creation failed")
});

pub static PRUNE_OBJECTS_DELETED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kennel_prune_objects_deleted_total",
            "Total orphaned objects deleted, by bucket",
        ),
        &["bucket"],
    )
    .expect("metric creation failed")
});

pub static PRUNE_BATCH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kennel_prune_batch_failures_total",
            "Total failed bulk delete batches, by bucket",
        ),
        &["bucket"],
    )
    .expect("metric creation failed")
});

pub static PRUNE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "kennel_prune_duration_seconds",
            "Prune run duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

// Export metrics
pub static EXPORTS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kennel_exports_started_total",
        "Total dog archive exports started",
    )
    .expect("metric creation failed")
});

pub static EXPORT_MEDIA_SKIPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kennel_export_media_skipped_total",
        "Total media objects left out of exports because the download failed",
    )
    .expect("metric creation failed")
});

// Auth metrics
pub static AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kennel_auth_failures_total",
            "Total rejected requests, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(PRUNE_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRUNE_OBJECTS_EXAMINED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRUNE_ORPHANS_FOUND.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRUNE_OBJECTS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRUNE_BATCH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRUNE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EXPORTS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EXPORT_MEDIA_SKIPPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a rejected request.
pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES.with_label_values(&[reason]).inc();
}
