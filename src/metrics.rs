//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridpresence_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridpresence_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_EVICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridpresence_cache_evictions_total", "Total number of capacity evictions"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gridpresence_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Store Metrics
    pub static ref STORE_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridpresence_store_queries_total", "Total number of record store queries"),
        &["operation", "status"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref DISPLAY_NAME_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "gridpresence_display_name_requests_total",
            "Total number of display-name requests sent to remote authorities"
        ),
        &["status"]
    ).expect("metric can be created");
    pub static ref DISPLAY_NAME_REFRESH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "gridpresence_display_name_refresh_duration_seconds",
            "Wall-clock duration of a display-name refresh batch"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["outcome"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gridpresence_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("CACHE_HITS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("CACHE_MISSES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_EVICTIONS_TOTAL.clone()))
            .expect("CACHE_EVICTIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_SIZE.clone()))
            .expect("CACHE_SIZE can be registered");
        REGISTRY
            .register(Box::new(STORE_QUERIES_TOTAL.clone()))
            .expect("STORE_QUERIES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(DISPLAY_NAME_REQUESTS_TOTAL.clone()))
            .expect("DISPLAY_NAME_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(DISPLAY_NAME_REFRESH_DURATION_SECONDS.clone()))
            .expect("DISPLAY_NAME_REFRESH_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record the outcome of a single record store call.
pub fn observe_store_query(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    STORE_QUERIES_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record the duration of one display-name refresh batch.
pub fn observe_refresh(outcome: &str, elapsed: Duration) {
    DISPLAY_NAME_REFRESH_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}
