//! Metrics collection and exposition.
//!
//! # Metrics
//! - `blog_requests_total` (counter): requests by method, status
//! - `blog_request_duration_seconds` (histogram): handler latency by method
//! - `blog_rate_limited_total` (counter): requests rejected with 429
//! - `blog_rate_limiter_clients` (gauge): buckets currently tracked
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "blog_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("blog_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("blog_rate_limited_total").increment(1);
}

pub fn record_tracked_clients(count: usize) {
    gauge!("blog_rate_limiter_clients").set(count as f64);
}
