// src/metrics.rs
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

use crate::error::{MonitorError, MonitorResult};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Polling cycles completed.");
        describe_counter!(
            "monitor_probe_failures_total",
            "Source probes that failed or timed out."
        );
        describe_counter!("monitor_stock_found_total", "StockFound events emitted.");
        describe_counter!(
            "monitor_dedup_suppressed_total",
            "Available candidates suppressed by the dedup window."
        );
        describe_counter!(
            "monitor_short_circuit_total",
            "Cycles where the retailer phase was skipped."
        );
        describe_gauge!(
            "monitor_source_consecutive_failures",
            "Consecutive failures per source."
        );
        describe_gauge!("monitor_next_delay_secs", "Delay before the next cycle.");
        describe_histogram!("monitor_probe_ms", "Per-source probe time in milliseconds.");
        describe_counter!("notify_delivery_errors_total", "Sink delivery failures.");
        describe_counter!("notify_dropped_total", "Events dropped on a full queue.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("feed_items_total", "Feed items parsed.");
        describe_counter!("feed_fetch_errors_total", "Feed HTTP errors.");
        describe_counter!("feed_mentions_dropped_total", "Feed mentions judged off-topic by the oracle.");
    });
}

/// Install the Prometheus recorder with its own `/metrics` listener.
/// Must be called from inside a tokio runtime.
pub fn install_exporter(addr: &str) -> MonitorResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| MonitorError::config(format!("metrics_addr `{addr}`: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitorError::config(format!("prometheus exporter: {e}")))?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
