use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "flexibook_http_requests_total";

/// Histogram: request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "flexibook_http_request_duration_seconds";

/// Counter: bookings confirmed.
pub const BOOKINGS_CREATED_TOTAL: &str = "flexibook_bookings_created_total";

/// Counter: booking attempts rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "flexibook_booking_conflicts_total";

/// Counter: notifications handled by the dispatcher. Labels: status.
pub const NOTIFICATIONS_SENT_TOTAL: &str = "flexibook_notifications_sent_total";

/// Counter: failed sign-ins.
pub const AUTH_FAILURES_TOTAL: &str = "flexibook_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "flexibook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "flexibook_wal_flush_batch_size";

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Collapse a request path to its route so ids don't explode label cardinality.
pub fn route_label(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.len() == 26 && seg.parse::<ulid::Ulid>().is_ok() {
                "{id}"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
