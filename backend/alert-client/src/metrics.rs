use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

use crate::models::{ConnectionState, Severity};

static ALERTS_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "alert_client_alerts_received_total",
            "Alerts delivered by the gateway, by severity",
        ),
        &["severity"],
    )
    .expect("failed to create alert_client_alerts_received_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register alert_client_alerts_received_total");
    counter
});

static ACKNOWLEDGMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "alert_client_acknowledgments_total",
            "Alert acknowledgments, by outcome (sent or dropped)",
        ),
        &["outcome"],
    )
    .expect("failed to create alert_client_acknowledgments_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register alert_client_acknowledgments_total");
    counter
});

static CONNECT_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "alert_client_connect_errors_total",
            "Connection errors, by whether they ended reconnection",
        ),
        &["kind"],
    )
    .expect("failed to create alert_client_connect_errors_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register alert_client_connect_errors_total");
    counter
});

static CONNECTION_STATE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "alert_client_connection_state",
        "0 = disconnected, 1 = connecting, 2 = connected",
    )
    .expect("failed to create alert_client_connection_state");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register alert_client_connection_state");
    gauge
});

pub fn record_alert(severity: Severity) {
    ALERTS_RECEIVED_TOTAL
        .with_label_values(&[severity.as_str()])
        .inc();
}

pub fn record_acknowledgment(sent: bool) {
    let outcome = if sent { "sent" } else { "dropped" };
    ACKNOWLEDGMENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_connect_error(terminal: bool) {
    let kind = if terminal { "terminal" } else { "retry" };
    CONNECT_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
    };
    CONNECTION_STATE.set(value);
}

/// Prometheus text exposition of everything on the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
