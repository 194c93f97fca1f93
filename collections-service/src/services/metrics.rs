//! Prometheus metrics for collections-service.
//!
//! Domain counters live in the default prometheus registry. HTTP metrics
//! emitted through the `metrics` facade by the shared middleware are
//! rendered by the exporter handle installed in [`init_metrics`].

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Reminder attempts by channel and outcome (sent, failed).
pub static REMINDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collections_reminders_total",
        "Total reminder attempts by channel and outcome",
        &["channel", "outcome"]
    )
    .expect("Failed to register reminders_total")
});

/// Sends refused before reaching a provider.
pub static QUOTA_DENIALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collections_quota_denials_total",
        "Total WhatsApp sends refused by the quota tracker",
        &["reason"] // quota_exceeded, plan_not_eligible
    )
    .expect("Failed to register quota_denials_total")
});

/// Debt status transitions.
pub static DEBT_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collections_debt_transitions_total",
        "Total debt status transitions",
        &["from", "to"]
    )
    .expect("Failed to register debt_transitions_total")
});

/// Payment amount applied to debts by currency.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collections_payment_amount_total",
        "Total payment amount applied by currency",
        &["currency"]
    )
    .expect("Failed to register payment_amount_total")
});

/// Claim resolutions by outcome (verified, rejected).
pub static CLAIMS_RESOLVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collections_claims_resolved_total",
        "Total payment claims resolved by outcome",
        &["outcome"]
    )
    .expect("Failed to register claims_resolved_total")
});

/// Provider call duration by channel.
pub static SEND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "collections_send_duration_seconds",
        "Channel sender call duration in seconds",
        &["channel"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register send_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "collections_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Installs the `metrics` recorder and forces the domain collectors.
/// Safe to call more than once; only the first recorder is kept.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    Lazy::force(&REMINDERS_TOTAL);
    Lazy::force(&QUOTA_DENIALS_TOTAL);
    Lazy::force(&DEBT_TRANSITIONS_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&CLAIMS_RESOLVED_TOTAL);
    Lazy::force(&SEND_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}
