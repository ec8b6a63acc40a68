use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SplitMetrics;

impl SplitMetrics {
    pub fn record_assignment(train: usize, val: usize, test: usize, excluded: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "split", "train_size")).set(train as f64);
        ::metrics::gauge!(phase_metric!(gauge, "split", "val_size")).set(val as f64);
        ::metrics::gauge!(phase_metric!(gauge, "split", "test_size")).set(test as f64);
        ::metrics::gauge!(phase_metric!(gauge, "split", "excluded_records")).set(excluded as f64);
    }
}

impl PhaseMetrics for SplitMetrics {
    fn register_metrics() {
        let _ = ::metrics::gauge!(phase_metric!(gauge, "split", "train_size"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "split", "val_size"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "split", "test_size"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "split", "excluded_records"));
    }

    fn phase_name() -> &'static str {
        "split"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(gauge, "split", "train_size"),
                metric_type: MetricType::Gauge,
                help: "Records assigned to the train split",
            },
            MetricDoc {
                name: phase_metric!(gauge, "split", "val_size"),
                metric_type: MetricType::Gauge,
                help: "Records assigned to the validation split",
            },
            MetricDoc {
                name: phase_metric!(gauge, "split", "test_size"),
                metric_type: MetricType::Gauge,
                help: "Records assigned to the test split",
            },
            MetricDoc {
                name: phase_metric!(gauge, "split", "excluded_records"),
                metric_type: MetricType::Gauge,
                help: "Incomplete records left out of every split",
            },
        ]
    }
}
