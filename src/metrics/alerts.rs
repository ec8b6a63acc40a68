use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct AlertMetrics;

impl AlertMetrics {
    pub fn record_alert(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "alerts", "events"), "kind" => kind).increment(1);
    }
}

impl PhaseMetrics for AlertMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "alerts", "events"));
    }

    fn phase_name() -> &'static str {
        "alerts"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![MetricDoc {
            name: phase_metric!(counter, "alerts", "events"),
            metric_type: MetricType::Counter,
            help: "Alert events appended to the run's alert log, by kind",
        }]
    }
}
