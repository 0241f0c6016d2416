//! Prometheus metrics for detour.
//!
//! Tracks redirect decisions, index maintenance, and proxy performance.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntCounter, TextEncoder,
};
use std::time::Duration;
use tracing::warn;

lazy_static! {
    /// Total number of requests processed
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "detour_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .expect("register detour_requests_total");

    /// Redirect decisions per site
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "detour_decisions_total",
        "Redirect decisions taken by the interceptor",
        &["site", "decision"]  // decision: none|send_now|defer
    )
    .expect("register detour_decisions_total");

    /// Redirects actually sent to clients
    pub static ref REDIRECTS_SENT_TOTAL: CounterVec = register_counter_vec!(
        "detour_redirects_sent_total",
        "Redirect responses sent to clients",
        &["site", "mode"]  // mode: immediate|after_not_found
    )
    .expect("register detour_redirects_sent_total");

    /// Full-site rebuilds
    pub static ref REBUILDS_TOTAL: CounterVec = register_counter_vec!(
        "detour_rebuilds_total",
        "Full-site index rebuilds",
        &["site", "outcome"]  // outcome: success|missing|failed
    )
    .expect("register detour_rebuilds_total");

    /// Rebuild duration
    pub static ref REBUILD_DURATION_MS: HistogramVec = register_histogram_vec!(
        "detour_rebuild_duration_ms",
        "Histogram of full-site rebuild time in milliseconds",
        &["site"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]
    )
    .expect("register detour_rebuild_duration_ms");

    /// Per-rule index updates
    pub static ref ITEM_UPDATES_TOTAL: CounterVec = register_counter_vec!(
        "detour_item_updates_total",
        "Per-rule index updates applied from change events",
        &["outcome"]  // outcome: upserted|removed|skipped|deferred|failed
    )
    .expect("register detour_item_updates_total");

    /// Change events for which no site could be found
    pub static ref ORPHAN_EVENTS_TOTAL: IntCounter = register_int_counter!(
        "detour_orphan_events_total",
        "Change events dropped because no site owns the rule"
    )
    .expect("register detour_orphan_events_total");

    /// Rules currently indexed
    pub static ref INDEXED_RULES: GaugeVec = register_gauge_vec!(
        "detour_indexed_rules",
        "Number of rules in each site's live index",
        &["site"]
    )
    .expect("register detour_indexed_rules");

    /// Proxy request duration
    pub static ref PROXY_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "detour_proxy_request_duration_ms",
        "Total request duration including redirect resolution and forwarding",
        &["method", "decision"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .expect("register detour_proxy_request_duration_ms");

    /// Upstream request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "detour_upstream_request_duration_ms",
        "Duration of upstream requests",
        &["method", "status"]
    )
    .expect("register detour_upstream_request_duration_ms");
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_decision(site: &str, decision: &str) {
    DECISIONS_TOTAL.with_label_values(&[site, decision]).inc();
}

pub fn record_redirect_sent(site: &str, mode: &str) {
    REDIRECTS_SENT_TOTAL.with_label_values(&[site, mode]).inc();
}

pub fn record_rebuild(site: &str, outcome: &str, duration: Duration) {
    REBUILDS_TOTAL.with_label_values(&[site, outcome]).inc();
    REBUILD_DURATION_MS
        .with_label_values(&[site])
        .observe(duration.as_secs_f64() * 1000.0);
}

pub fn record_item_update(outcome: &str) {
    ITEM_UPDATES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_orphan_event() {
    ORPHAN_EVENTS_TOTAL.inc();
}

pub fn set_indexed_rules(site: &str, count: usize) {
    INDEXED_RULES.with_label_values(&[site]).set(count as f64);
}

pub fn record_proxy_duration(method: &str, duration_ms: f64, decision: &str) {
    PROXY_REQUEST_DURATION_MS
        .with_label_values(&[method, decision])
        .observe(duration_ms);
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("GET", 200);
        record_decision("metrics-site", "send_now");
        record_redirect_sent("metrics-site", "immediate");

        let metrics = collect_metrics();
        assert!(metrics.contains("detour_requests_total"));
        assert!(metrics.contains("detour_decisions_total"));
        assert!(metrics.contains("detour_redirects_sent_total"));
    }

    #[test]
    fn test_maintenance_metrics() {
        record_rebuild("metrics-site", "success", Duration::from_millis(12));
        record_rebuild("metrics-site", "missing", Duration::from_micros(300));
        record_item_update("upserted");
        record_item_update("removed");
        record_orphan_event();

        let metrics = collect_metrics();
        assert!(metrics.contains("detour_rebuilds_total"));
        assert!(metrics.contains("detour_rebuild_duration_ms"));
        assert!(metrics.contains("detour_item_updates_total"));
        assert!(metrics.contains("detour_orphan_events_total"));
    }

    #[test]
    fn test_indexed_rules_gauge_is_replaced() {
        set_indexed_rules("gauge-site", 10);
        set_indexed_rules("gauge-site", 3);
        assert_eq!(INDEXED_RULES.with_label_values(&["gauge-site"]).get(), 3.0);
    }

    #[test]
    fn test_duration_histograms() {
        record_proxy_duration("GET", 3.5, "none");
        record_upstream_duration("GET", 404, 2.0);

        let metrics = collect_metrics();
        assert!(metrics.contains("detour_proxy_request_duration_ms"));
        assert!(metrics.contains("detour_upstream_request_duration_ms"));
    }
}
