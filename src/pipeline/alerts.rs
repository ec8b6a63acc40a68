//! Threshold alerting and the per-run alert log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ThresholdConfig;
use crate::error::Result;
use crate::metrics::AlertMetrics;
use crate::pipeline::aggregate::LedgerMetrics;
use crate::pipeline::bias::BiasFinding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertPayload {
    PipelineFailure { stage: String, error: String },
    DataQuality { violations: Vec<String> },
}

impl AlertPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertPayload::PipelineFailure { .. } => "pipeline_failure",
            AlertPayload::DataQuality { .. } => "data_quality",
        }
    }
}

/// A single alert: `{"timestamp": ..., "type": ..., <payload fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: AlertPayload,
}

impl AlertEvent {
    pub fn now(payload: AlertPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn data_quality(violation: String) -> Self {
        Self::now(AlertPayload::DataQuality {
            violations: vec![violation],
        })
    }
}

/// Compares ledger aggregates and bias findings against thresholds.
pub struct AlertEngine {
    thresholds: ThresholdConfig,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::with_thresholds(ThresholdConfig::default())
    }

    pub fn with_thresholds(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    /// One `data_quality` event per violated threshold (quality, blur,
    /// missing values, duplicates), then one per detected bias finding.
    /// Metrics that were not measured are not checked.
    pub fn evaluate(&self, metrics: &LedgerMetrics, findings: &[BiasFinding]) -> Vec<AlertEvent> {
        let t = &self.thresholds;
        let mut violations = Vec::new();

        if let Some(q) = metrics.avg_quality_score.filter(|q| *q < t.quality_score_min) {
            violations.push(format!(
                "Quality score {:.3} below threshold {:.3}",
                q, t.quality_score_min
            ));
        }
        if let Some(b) = metrics.blur_rate.filter(|b| *b > t.blur_rate_max) {
            violations.push(format!(
                "Blur rate {:.3} exceeds threshold {:.3}",
                b, t.blur_rate_max
            ));
        }
        if let Some(m) = metrics.missing_values_rate.filter(|m| *m > t.missing_values_max) {
            violations.push(format!(
                "Missing values rate {:.3} exceeds threshold {:.3}",
                m, t.missing_values_max
            ));
        }
        if let Some(d) = metrics.duplicate_rate.filter(|d| *d > t.duplicate_rate_max) {
            violations.push(format!(
                "Duplicate rate {:.3} exceeds threshold {:.3}",
                d, t.duplicate_rate_max
            ));
        }
        for finding in findings.iter().filter(|f| f.detected) {
            violations.push(format!(
                "{} detected: {}",
                finding.check_type.as_str(),
                finding.detail
            ));
        }

        violations.into_iter().map(AlertEvent::data_quality).collect()
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only alert log owned by a single pipeline run.
#[derive(Debug, Default)]
pub struct AlertLog {
    events: Vec<AlertEvent>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AlertEvent) {
        AlertMetrics::record_alert(event.payload.kind());
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = AlertEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Record a fatal stage error. Never fails.
    pub fn record_failure(&mut self, stage: &str, error: &str) {
        warn!(stage, error, "Pipeline stage failed");
        self.push(AlertEvent::now(AlertPayload::PipelineFailure {
            stage: stage.to_string(),
            error: error.to_string(),
        }));
    }

    pub fn events(&self) -> &[AlertEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand every event to `sink`.
    pub fn flush(&self, sink: &dyn AlertSink) -> Result<()> {
        sink.deliver(&self.events)
    }
}

/// Destination for a run's alerts.
pub trait AlertSink {
    fn deliver(&self, events: &[AlertEvent]) -> Result<()>;
}

/// Writes the alert log as a pretty-printed JSON array.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSink for JsonFileSink {
    fn deliver(&self, events: &[AlertEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(events)?)?;
        info!(path = %self.path.display(), events = events.len(), "Alert log written");
        Ok(())
    }
}

/// Emits each alert as a `warn!` record.
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn deliver(&self, events: &[AlertEvent]) -> Result<()> {
        for event in events {
            match &event.payload {
                AlertPayload::PipelineFailure { stage, error } => {
                    warn!(alert = "pipeline_failure", %stage, %error, "ALERT")
                }
                AlertPayload::DataQuality { violations } => {
                    warn!(alert = "data_quality", violations = %violations.join("; "), "ALERT")
                }
            }
        }
        Ok(())
    }
}

pub fn read_alert_log(path: &Path) -> Result<Vec<AlertEvent>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bias::{BiasCheckType, BiasStatistic};
    use tempfile::tempdir;

    fn violations(event: &AlertEvent) -> &[String] {
        match &event.payload {
            AlertPayload::DataQuality { violations } => violations,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_low_quality_and_high_blur_yield_two_events() {
        let metrics = LedgerMetrics {
            avg_quality_score: Some(0.45),
            blur_rate: Some(0.15),
            ..LedgerMetrics::default()
        };
        let events = AlertEngine::new().evaluate(&metrics, &[]);
        assert_eq!(events.len(), 2);
        assert!(violations(&events[0])[0].starts_with("Quality score 0.450 below threshold"));
        assert!(violations(&events[1])[0].starts_with("Blur rate 0.150 exceeds threshold"));
    }

    #[test]
    fn test_unmeasured_metrics_are_not_checked() {
        assert!(AlertEngine::new()
            .evaluate(&LedgerMetrics::default(), &[])
            .is_empty());

        let healthy = LedgerMetrics {
            document_count: 10,
            avg_quality_score: Some(0.8),
            blur_rate: Some(0.0),
            missing_values_rate: Some(0.01),
            duplicate_rate: Some(0.0),
        };
        assert!(AlertEngine::new().evaluate(&healthy, &[]).is_empty());
    }

    #[test]
    fn test_detected_bias_follows_threshold_events() {
        let metrics = LedgerMetrics {
            duplicate_rate: Some(0.5),
            ..LedgerMetrics::default()
        };
        let findings = vec![
            BiasFinding {
                check_type: BiasCheckType::SizeBias,
                detected: false,
                statistic: BiasStatistic::Correlation(0.1),
                detail: "fine".to_string(),
                group_means: None,
            },
            BiasFinding {
                check_type: BiasCheckType::FormatBias,
                detected: true,
                statistic: BiasStatistic::MeanDifference(0.4),
                detail: "spread 0.4".to_string(),
                group_means: None,
            },
        ];
        let events = AlertEngine::new().evaluate(&metrics, &findings);
        assert_eq!(events.len(), 2);
        assert!(violations(&events[0])[0].starts_with("Duplicate rate"));
        assert_eq!(violations(&events[1])[0], "format_bias detected: spread 0.4");
    }

    #[test]
    fn test_flush_writes_json_array() {
        let mut log = AlertLog::new();
        log.record_failure("split", "No complete records available to split");
        log.extend(vec![AlertEvent::data_quality("Blur rate 0.150 exceeds threshold".to_string())]);

        let dir = tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("reports/alerts.json"));
        log.flush(&sink).unwrap();
        log.flush(&TracingSink).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sink.path()).unwrap()).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["type"], "pipeline_failure");
        assert_eq!(array[0]["stage"], "split");
        assert_eq!(array[1]["type"], "data_quality");
        assert!(array[1]["timestamp"].is_string());

        assert_eq!(read_alert_log(sink.path()).unwrap(), log.events());
    }
}
