//! Phase-organized metrics for the governance pipeline
//!
//! Each pipeline stage owns a submodule that records its own counters and
//! gauges under a `ledgerx_{phase}_{name}` prefix. Recording is always cheap:
//! without an installed recorder the `metrics` macros are no-ops.

pub mod alerts;
pub mod assess;
pub mod bias;
pub mod ledger;
pub mod registry;
pub mod split;

pub use alerts::AlertMetrics;
pub use assess::AssessMetrics;
pub use bias::BiasMetrics;
pub use ledger::LedgerPhaseMetrics;
pub use split::SplitMetrics;

use std::sync::Once;
use tracing::{info, warn};

/// Env var holding the socket address for the Prometheus scrape endpoint.
pub const METRICS_ADDR_ENV: &str = "LEDGERX_METRICS_ADDR";

static INIT: Once = Once::new();

/// Install the Prometheus exporter when `LEDGERX_METRICS_ADDR` is set.
///
/// Idempotent. Must be called from within a tokio runtime because the
/// exporter serves its HTTP listener on it.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                info!("{} not set, metrics exporter disabled", METRICS_ADDR_ENV);
                return;
            }
        };
        let addr = match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}", addr_str, e);
                return;
            }
        };
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

/// Implemented by each stage's metrics collection.
pub trait PhaseMetrics {
    /// Pre-register all metrics for this phase.
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names following `ledgerx_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("ledgerx_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("ledgerx_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("ledgerx_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_metric_naming() {
        assert_eq!(
            phase_metric!(counter, "assess", "documents_assessed"),
            "ledgerx_assess_documents_assessed_total"
        );
        assert_eq!(phase_metric!(gauge, "split", "train_size"), "ledgerx_split_train_size");
    }
}
