use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct BiasMetrics;

impl BiasMetrics {
    pub fn record_finding(check_type: &'static str, detected: bool, statistic: f64) {
        ::metrics::counter!(phase_metric!(counter, "bias", "checks_run"), "check" => check_type)
            .increment(1);
        if detected {
            ::metrics::counter!(phase_metric!(counter, "bias", "biases_detected"), "check" => check_type)
                .increment(1);
        }
        ::metrics::gauge!(phase_metric!(gauge, "bias", "statistic"), "check" => check_type)
            .set(statistic);
    }
}

impl PhaseMetrics for BiasMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "bias", "checks_run"));
        let _ = ::metrics::counter!(phase_metric!(counter, "bias", "biases_detected"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "bias", "statistic"));
    }

    fn phase_name() -> &'static str {
        "bias"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "bias", "checks_run"),
                metric_type: MetricType::Counter,
                help: "Bias checks evaluated, by check type",
            },
            MetricDoc {
                name: phase_metric!(counter, "bias", "biases_detected"),
                metric_type: MetricType::Counter,
                help: "Bias checks that reported a detection, by check type",
            },
            MetricDoc {
                name: phase_metric!(gauge, "bias", "statistic"),
                metric_type: MetricType::Gauge,
                help: "Latest statistic value per check type",
            },
        ]
    }
}
