//! Prometheus metrics for build-break observability.

use std::net::SocketAddr;

use metrics::counter;

/// Initialize metrics exporter (Prometheus).
///
/// Without `addr` the recorder is installed but nothing is served.
pub fn init_metrics(addr: Option<SocketAddr>) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let result = match addr {
        Some(addr) => builder.with_http_listener(addr).install(),
        None => builder.install_recorder().map(|_| ()),
    };
    if let Err(e) = result {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a datagram received on the notification socket.
pub fn datagram_received() {
    counter!("wbb_datagrams_received_total").increment(1);
}

/// Record a decoded build notification.
pub fn build_seen(phase: &str, status: &str) {
    counter!(
        "wbb_builds_total",
        "phase" => phase.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed, failed build.
pub fn build_break() {
    counter!("wbb_build_breaks_total").increment(1);
}

/// Record a breaker called out in chat.
pub fn breaker_notified() {
    counter!("wbb_breakers_notified_total").increment(1);
}

/// Record a failed build no configured member could be tied to.
pub fn unattributed_break() {
    counter!("wbb_unattributed_breaks_total").increment(1);
}

/// Record a per-event error.
pub fn event_error(category: &str) {
    counter!("wbb_event_errors_total", "category" => category.to_string()).increment(1);
}
