//! Registers every phase's metrics once and detects name conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::AssessMetrics>(&mut all_metrics);
    register_phase_metrics::<super::LedgerPhaseMetrics>(&mut all_metrics);
    register_phase_metrics::<super::SplitMetrics>(&mut all_metrics);
    register_phase_metrics::<super::BiasMetrics>(&mut all_metrics);
    register_phase_metrics::<super::AlertMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, (&'static str, MetricDoc)>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if let Some((existing_phase, _)) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict: '{}' is defined in both '{}' and '{}'",
                doc.name, existing_phase, phase_name
            );
        } else {
            debug!(metric = doc.name, kind = ?doc.metric_type, help = doc.help, "registered");
            all_metrics.insert(doc.name, (phase_name, doc));
        }
    }
}

/// All documented metric names, sorted.
pub fn documented_metric_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = super::AssessMetrics::metrics_documentation()
        .into_iter()
        .chain(super::LedgerPhaseMetrics::metrics_documentation())
        .chain(super::SplitMetrics::metrics_documentation())
        .chain(super::BiasMetrics::metrics_documentation())
        .chain(super::AlertMetrics::metrics_documentation())
        .map(|doc| doc.name)
        .collect();
    names.sort_unstable();
    names
}
