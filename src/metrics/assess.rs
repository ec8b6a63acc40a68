//! Assessment phase metrics: documents scored, excluded, and the quality
//! score distribution.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct AssessMetrics;

impl AssessMetrics {
    pub fn record_assessed(quality_score: f64, has_blur: bool) {
        ::metrics::counter!(phase_metric!(counter, "assess", "documents_assessed")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "assess", "quality_score"))
            .record(quality_score);
        if has_blur {
            ::metrics::counter!(phase_metric!(counter, "assess", "blurred_documents")).increment(1);
        }
    }

    pub fn record_excluded() {
        ::metrics::counter!(phase_metric!(counter, "assess", "documents_excluded")).increment(1);
    }
}

impl PhaseMetrics for AssessMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "assess", "documents_assessed"));
        let _ = ::metrics::counter!(phase_metric!(counter, "assess", "blurred_documents"));
        let _ = ::metrics::counter!(phase_metric!(counter, "assess", "documents_excluded"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "assess", "quality_score"));
    }

    fn phase_name() -> &'static str {
        "assess"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "assess", "documents_assessed"),
                metric_type: MetricType::Counter,
                help: "Documents successfully assessed",
            },
            MetricDoc {
                name: phase_metric!(counter, "assess", "blurred_documents"),
                metric_type: MetricType::Counter,
                help: "Assessed documents flagged as blurred",
            },
            MetricDoc {
                name: phase_metric!(counter, "assess", "documents_excluded"),
                metric_type: MetricType::Counter,
                help: "Documents excluded because they could not be read or decoded",
            },
            MetricDoc {
                name: phase_metric!(histogram, "assess", "quality_score"),
                metric_type: MetricType::Histogram,
                help: "Normalized quality score per assessed document",
            },
        ]
    }
}
