//! Prometheus metrics for billcraft-api.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Invoice counter by status.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billcraft_invoices_total",
        "Total number of invoices by status",
        &["status"] // draft, sent, paid, overdue
    )
    .expect("Failed to register invoices_total")
});

/// Monetary amount counter by currency.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billcraft_invoice_amount_total",
        "Total invoiced amount by currency",
        &["currency"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Checkout session counter by tier.
pub static CHECKOUT_SESSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billcraft_checkout_sessions_total",
        "Total number of checkout sessions created by tier",
        &["tier"]
    )
    .expect("Failed to register checkout_sessions_total")
});

/// Webhook event counter by event type.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billcraft_webhook_events_total",
        "Total number of payment provider webhook events by type",
        &["event"]
    )
    .expect("Failed to register webhook_events_total")
});

/// Plan-limit denial counter by resource.
pub static GATING_DENIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billcraft_gating_denied_total",
        "Creations denied by plan limits, by resource",
        &["resource"] // invoice, client
    )
    .expect("Failed to register gating_denied_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billcraft_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&CHECKOUT_SESSIONS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&GATING_DENIED_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
