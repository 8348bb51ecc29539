//! Prometheus counters for the proxy.
//!
//! Recording is a no-op until `init_metrics` installs the recorder, so library users and
//! tests never need it.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global recorder once. Later calls are ignored.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_ok() {
                info!("Prometheus recorder installed");
            }
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Exposition text for the `/metrics` endpoint, or `None` before `init_metrics`.
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub struct ProxyMetrics;

impl ProxyMetrics {
    pub fn record_cache_hit() {
        ::metrics::counter!("proxy_cache_hits_total").increment(1);
    }

    pub fn record_cache_miss() {
        ::metrics::counter!("proxy_cache_misses_total").increment(1);
    }

    pub fn record_upstream_fetch(duration_secs: f64) {
        ::metrics::counter!("proxy_upstream_fetches_total").increment(1);
        ::metrics::histogram!("proxy_upstream_fetch_seconds").record(duration_secs);
    }

    pub fn record_upstream_error() {
        ::metrics::counter!("proxy_upstream_errors_total").increment(1);
    }

    pub fn record_cache_write_error() {
        ::metrics::counter!("proxy_cache_write_errors_total").increment(1);
    }

    pub fn record_forbidden() {
        ::metrics::counter!("proxy_forbidden_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        ProxyMetrics::record_cache_hit();
        ProxyMetrics::record_upstream_fetch(0.25);
        ProxyMetrics::record_forbidden();
    }
}
