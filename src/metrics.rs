use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "hookbin_captures_total",
        "Total number of captured webhook requests"
    );
    describe_counter!(
        "hookbin_capture_errors_total",
        "Total number of failed capture attempts"
    );
    describe_counter!(
        "hookbin_unresolved_slugs_total",
        "Total number of ingress requests for unknown slugs"
    );
    describe_counter!(
        "hookbin_stream_events_total",
        "Total number of records delivered over live sessions"
    );
    describe_gauge!(
        "hookbin_live_sessions",
        "Number of currently open live update sessions"
    );
    describe_gauge!("hookbin_info", "Service version and build information");

    gauge!("hookbin_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a successful capture
pub fn record_capture(method: &str) {
    counter!("hookbin_captures_total", "method" => method.to_string()).increment(1);
}

/// Record a failed capture attempt
pub fn record_capture_error(error_type: &str) {
    counter!("hookbin_capture_errors_total", "error_type" => error_type.to_string()).increment(1);
}

/// Record an ingress request that resolved to no endpoint
pub fn record_unresolved_slug() {
    counter!("hookbin_unresolved_slugs_total").increment(1);
}

/// Record records delivered to a live session
pub fn record_stream_events(count: u64) {
    counter!("hookbin_stream_events_total").increment(count);
}

/// A live session opened
pub fn session_opened() {
    gauge!("hookbin_live_sessions").increment(1.0);
}

/// A live session closed
pub fn session_closed() {
    gauge!("hookbin_live_sessions").decrement(1.0);
}
