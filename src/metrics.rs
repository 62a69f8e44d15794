//! Prometheus metrics collection for campusd.
//!
//! Exposed on a separate HTTP port for scraping. Everything here is
//! optional at runtime: recording helpers no-op until [`init`] runs, so
//! unit tests and metrics-disabled deployments pay nothing.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently open WebSocket connections.
pub static CONNECTED_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Scope buckets currently holding at least one connection.
pub static ACTIVE_SCOPES: OnceLock<IntGauge> = OnceLock::new();

/// Total broadcasts performed across all scopes.
pub static BROADCASTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Connections dropped for a full or closed outbound queue.
pub static SEND_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Fan-out histogram: successful deliveries per broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// State-bearing call signaling events by keyword.
pub static SIGNAL_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        CONNECTED_SESSIONS,
        IntGauge::new("campusd_connected_sessions", "Currently open WebSocket connections")
    );
    register!(
        ACTIVE_SCOPES,
        IntGauge::new("campusd_active_scopes", "Scope buckets with live connections")
    );
    register!(
        BROADCASTS_TOTAL,
        IntCounter::new("campusd_broadcasts_total", "Broadcasts performed")
    );
    register!(
        SEND_FAILURES,
        IntCounter::new(
            "campusd_send_failures_total",
            "Connections dropped for a full or closed outbound queue"
        )
    );
    register!(
        BROADCAST_FANOUT,
        Histogram::with_opts(
            HistogramOpts::new("campusd_broadcast_fanout", "Deliveries per broadcast")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0])
        )
    );
    register!(
        SIGNAL_EVENTS,
        IntCounterVec::new(
            Opts::new("campusd_signal_events_total", "Call signaling events by keyword"),
            &["event"]
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

#[inline]
pub fn session_opened() {
    if let Some(g) = CONNECTED_SESSIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn session_closed() {
    if let Some(g) = CONNECTED_SESSIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn set_active_scopes(count: usize) {
    if let Some(g) = ACTIVE_SCOPES.get() {
        g.set(count as i64);
    }
}

/// Record one fan-out pass: deliveries made and connections dropped.
#[inline]
pub fn record_broadcast(delivered: usize, failed: usize) {
    if let Some(c) = BROADCASTS_TOTAL.get() {
        c.inc();
    }
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(delivered as f64);
    }
    if failed > 0 {
        if let Some(c) = SEND_FAILURES.get() {
            c.inc_by(failed as u64);
        }
    }
}

#[inline]
pub fn record_signal_event(keyword: &str) {
    if let Some(c) = SIGNAL_EVENTS.get() {
        c.with_label_values(&[keyword]).inc();
    }
}
