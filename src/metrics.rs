//! Prometheus metrics for the solcodes server.
//!
//! Counters and histograms for refresh cycles, upstream RPC calls, cache
//! reads, code-store operations, and rate limiting.

use metrics::{counter, histogram};

/// Record the outcome of a refresh cycle. The duration histogram tracks
/// successful cycles only.
pub fn record_refresh_cycle(success: bool, duration_ms: u64) {
    counter!("refresh_cycles_total", "success" => success.to_string()).increment(1);
    if success {
        histogram!("refresh_cycle_duration_ms").record(duration_ms as f64);
    }
}

/// Record an upstream RPC call.
pub fn record_rpc_call(method: &str, success: bool, duration_ms: u64) {
    counter!("rpc_calls_total", "method" => method.to_string(), "success" => success.to_string())
        .increment(1);
    histogram!("rpc_call_duration_ms").record(duration_ms as f64);
}

/// Record a read of the stats cache.
pub fn record_cache_read() {
    counter!("stats_cache_reads_total").increment(1);
}

/// Record a code upsert.
pub fn record_code_upsert() {
    counter!("code_upserts_total").increment(1);
}

/// Record a code lookup.
pub fn record_code_lookup(found: bool) {
    counter!("code_lookups_total", "found" => found.to_string()).increment(1);
}

/// Record a rate limit hit.
pub fn record_rate_limit_hit() {
    counter!("rate_limit_hits_total").increment(1);
}

/// Install the Prometheus metrics exporter and return the recorder handle.
pub fn install_prometheus_recorder() -> metrics_exporter_prometheus::PrometheusHandle {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
