//! Prometheus metrics for the shortlink server.
//!
//! Exposes resolution outcomes, cache and filter effectiveness, lock
//! contention and statistics queue health.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no identifiers or origin URLs, only aggregate counts.
//! Restrict the endpoint to scraper addresses at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Resolution metrics
pub static RESOLVE_OUTCOMES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shortlink_resolve_total",
            "Total resolutions by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static RESOLVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "shortlink_resolve_duration_seconds",
            "Time to resolve a short link",
        )
        .buckets(vec![
            0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ]),
    )
    .expect("metric creation failed")
});

pub static BACKEND_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_backend_retries_total",
        "Total resolutions retried after a backend failure",
    )
    .expect("metric creation failed")
});

// Cache and filter metrics
pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_cache_hits_total",
        "Total positive cache hits",
    )
    .expect("metric creation failed")
});

pub static CACHE_NEGATIVE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_cache_negative_hits_total",
        "Total lookups answered by a negative cache entry",
    )
    .expect("metric creation failed")
});

pub static FILTER_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_filter_rejections_total",
        "Total lookups rejected by the existence filter",
    )
    .expect("metric creation failed")
});

pub static CACHE_WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_cache_write_failures_total",
        "Total cache writes that failed after a store load",
    )
    .expect("metric creation failed")
});

// Store and lock metrics
pub static STORE_LOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_store_loads_total",
        "Total link loads that reached the store",
    )
    .expect("metric creation failed")
});

pub static LOCK_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_lock_timeouts_total",
        "Total load-through lock waits that hit their ceiling",
    )
    .expect("metric creation failed")
});

// Statistics metrics
pub static STATS_PUBLISHED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_stats_published_total",
        "Total access events queued for the statistics sink",
    )
    .expect("metric creation failed")
});

pub static STATS_DROPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shortlink_stats_dropped_total",
            "Total access events dropped by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

// Lifecycle metrics
pub static LINKS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shortlink_links_created_total",
        "Total short links created",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(RESOLVE_OUTCOMES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESOLVE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BACKEND_RETRIES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_NEGATIVE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILTER_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_WRITE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STORE_LOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_TIMEOUTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STATS_PUBLISHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STATS_DROPPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LINKS_CREATED.clone()))
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

/// Record a resolution outcome label.
pub fn record_outcome(outcome: &str) {
    RESOLVE_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Record a dropped statistics event.
pub fn record_stats_dropped(reason: &str) {
    STATS_DROPPED.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        record_outcome("hit");
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "shortlink_resolve_total"));
    }
}
