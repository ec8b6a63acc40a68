use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Ledger build and validation metrics
pub struct LedgerPhaseMetrics;

impl LedgerPhaseMetrics {
    pub fn record_inserted() {
        ::metrics::counter!(phase_metric!(counter, "ledger", "records_inserted")).increment(1);
    }

    pub fn record_duplicate_rejected() {
        ::metrics::counter!(phase_metric!(counter, "ledger", "duplicates_rejected")).increment(1);
    }

    pub fn record_violations(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "ledger", "invariant_violations"))
            .increment(count as u64);
    }

    pub fn record_size(records: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "ledger", "records")).set(records as f64);
    }
}

impl PhaseMetrics for LedgerPhaseMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "ledger", "records_inserted"));
        let _ = ::metrics::counter!(phase_metric!(counter, "ledger", "duplicates_rejected"));
        let _ = ::metrics::counter!(phase_metric!(counter, "ledger", "invariant_violations"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "ledger", "records"));
    }

    fn phase_name() -> &'static str {
        "ledger"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ledger", "records_inserted"),
                metric_type: MetricType::Counter,
                help: "Records accepted into the ledger",
            },
            MetricDoc {
                name: phase_metric!(counter, "ledger", "duplicates_rejected"),
                metric_type: MetricType::Counter,
                help: "Inserts rejected because the checksum already existed",
            },
            MetricDoc {
                name: phase_metric!(counter, "ledger", "invariant_violations"),
                metric_type: MetricType::Counter,
                help: "Invariant violations reported by ledger validation",
            },
            MetricDoc {
                name: phase_metric!(gauge, "ledger", "records"),
                metric_type: MetricType::Gauge,
                help: "Records currently in the ledger",
            },
        ]
    }
}
