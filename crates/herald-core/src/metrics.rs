//! Prometheus metrics helpers for herald.
//!
//! # Usage
//!
//! ```rust,ignore
//! use herald_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("herald_events_routed_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `herald_`
//! - Suffix: unit or type (`_total`, `_ratio`)
//! - Labels: only low-cardinality ones (`reason`, `stage`)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_router_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_router_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds before returning so address errors surface to the caller, then
/// serves `/metrics` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for every metric herald emits.
pub fn register_router_metrics() {
    // =========================================================================
    // Ingestion queue
    // =========================================================================

    describe_counter!(
        "herald_messages_submitted_total",
        "Raw relay messages accepted by submit()"
    );
    describe_counter!(
        "herald_queue_overflow_total",
        "Queued messages discarded by the drop-oldest policy"
    );
    describe_gauge!("herald_queue_depth", "Messages waiting in the ingest queue");

    // =========================================================================
    // Pipeline outcomes
    // =========================================================================

    describe_counter!(
        "herald_parse_errors_total",
        "Unparseable messages and structurally invalid events"
    );
    describe_counter!(
        "herald_duplicates_total",
        "Duplicate events dropped (label: stage = precheck | mark)"
    );
    describe_counter!(
        "herald_events_routed_total",
        "Events handed to the delivery sink"
    );
    describe_counter!(
        "herald_events_dropped_total",
        "Events dropped by the pipeline (label: reason)"
    );
    describe_counter!(
        "herald_critical_violations_total",
        "Subscription/configuration consistency violations"
    );
    describe_counter!(
        "herald_cancellation_candidates_total",
        "Subscriptions that crossed the unmatched-event threshold"
    );
    describe_counter!(
        "herald_delivery_build_failures_total",
        "Delivery URI construction failures"
    );
    describe_counter!(
        "herald_dispatch_errors_total",
        "Per-message errors and panics caught by the dispatcher"
    );
    describe_counter!(
        "herald_control_messages_total",
        "EOSE, NOTICE, OK and unknown messages (label: kind)"
    );

    // =========================================================================
    // Dedupe cache
    // =========================================================================

    describe_gauge!("herald_dedupe_entries", "Event ids held in the dedupe cache");
    describe_gauge!(
        "herald_dedupe_utilization_ratio",
        "Dedupe cache size divided by capacity"
    );

    // =========================================================================
    // Diagnostics channel
    // =========================================================================

    describe_counter!(
        "herald_diagnostics_dropped_total",
        "Diagnostic records discarded because the channel was full"
    );
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter.
///
/// Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Increment a counter carrying a single label.
#[inline]
pub fn increment_labeled(name: &'static str, label: &'static str, value: &'static str) {
    metrics::counter!(name, label => value).increment(1);
}

/// Set a counter to an absolute value tracked elsewhere.
#[inline]
pub fn set_counter(name: &'static str, value: u64) {
    metrics::counter!(name).absolute(value);
}

/// Set a gauge value.
///
/// Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
