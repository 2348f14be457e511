//! Prometheus metrics for order-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use service_core::middleware::{install_http_metrics, render_http_metrics};

/// Created orders by initial status.
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_service_orders_total",
        "Total number of service orders created",
        &["status"]
    )
    .expect("Failed to register orders_total")
});

/// Committed status transitions.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_service_transitions_total",
        "Total number of order status transitions",
        &["from", "to"]
    )
    .expect("Failed to register transitions_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_service_errors_total",
        "Total number of errors by code",
        &["code"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "order_service_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Retried attempts of HTTP-driven operations.
pub static RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_service_retries_total",
        "Total number of retried order operations",
        &["operation"]
    )
    .expect("Failed to register retries_total")
});

/// Initialize all metrics (forces lazy initialization) and install the
/// recorder behind the HTTP request metrics.
pub fn init_metrics() {
    install_http_metrics();
    Lazy::force(&ORDERS_TOTAL);
    Lazy::force(&TRANSITIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RETRIES_TOTAL);
}

/// Get order and HTTP request metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut output = encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default();
    output.push_str(&render_http_metrics());
    output
}
