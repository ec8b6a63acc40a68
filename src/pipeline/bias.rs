//! Statistical bias checks over the metadata ledger.
//!
//! Checks never fail: whenever a statistic cannot be computed (too few
//! records, a constant column, a single group) the finding degrades to
//! `detected = false` with a zero statistic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::config::BiasConfig;
use crate::domain::DocumentRecord;
use crate::error::Result;
use crate::metrics::BiasMetrics;
use crate::pipeline::ledger::MetadataLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasCheckType {
    SizeBias,
    FormatBias,
}

impl BiasCheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiasCheckType::SizeBias => "size_bias",
            BiasCheckType::FormatBias => "format_bias",
        }
    }
}

/// The statistic a check measured, serialized under its own field name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasStatistic {
    Correlation(f64),
    MeanDifference(f64),
}

impl BiasStatistic {
    pub fn value(&self) -> f64 {
        match *self {
            BiasStatistic::Correlation(v) | BiasStatistic::MeanDifference(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasFinding {
    #[serde(rename = "type")]
    pub check_type: BiasCheckType,
    pub detected: bool,
    #[serde(flatten)]
    pub statistic: BiasStatistic,
    pub detail: String,
    /// Mean quality per file format, for the format check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_means: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub biases: Vec<BiasFinding>,
    pub total_biases: usize,
}

impl BiasReport {
    pub fn new(biases: Vec<BiasFinding>) -> Self {
        let total_biases = biases.iter().filter(|b| b.detected).count();
        Self {
            biases,
            total_biases,
        }
    }

    pub fn detected(&self) -> impl Iterator<Item = &BiasFinding> {
        self.biases.iter().filter(|b| b.detected)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub struct BiasDetector {
    config: BiasConfig,
}

impl BiasDetector {
    pub fn new() -> Self {
        Self::with_config(BiasConfig::default())
    }

    pub fn with_config(config: BiasConfig) -> Self {
        Self { config }
    }

    /// Pearson correlation between file size and quality score.
    pub fn check_size_bias(&self, records: &[DocumentRecord]) -> BiasFinding {
        let sizes: Vec<f64> = records.iter().map(|r| r.file_size_bytes as f64).collect();
        let scores: Vec<f64> = records.iter().map(|r| r.quality_score).collect();

        let (correlation, detected, detail) = match pearson(&sizes, &scores) {
            Some(r) => {
                let detected = r.abs() > self.config.size_correlation_max;
                let detail = format!(
                    "|r| = {:.3} {} limit {:.3} over {} documents",
                    r.abs(),
                    if detected { "exceeds" } else { "within" },
                    self.config.size_correlation_max,
                    records.len()
                );
                (r, detected, detail)
            }
            None => (
                0.0,
                false,
                format!(
                    "correlation undefined for {} documents (need 2+ with varying size and quality)",
                    records.len()
                ),
            ),
        };

        BiasFinding {
            check_type: BiasCheckType::SizeBias,
            detected,
            statistic: BiasStatistic::Correlation(correlation),
            detail,
            group_means: None,
        }
    }

    /// Spread between the highest and lowest mean quality per file format.
    pub fn check_format_bias(&self, records: &[DocumentRecord]) -> BiasFinding {
        let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for record in records {
            let entry = groups.entry(record.file_format.clone()).or_insert((0.0, 0));
            entry.0 += record.quality_score;
            entry.1 += 1;
        }
        let group_means: BTreeMap<String, f64> = groups
            .into_iter()
            .map(|(format, (sum, count))| (format, sum / count as f64))
            .collect();

        let (difference, detected, detail) = if group_means.len() < 2 {
            (
                0.0,
                false,
                format!("{} format group(s), nothing to compare", group_means.len()),
            )
        } else {
            let max = group_means.values().cloned().fold(f64::MIN, f64::max);
            let min = group_means.values().cloned().fold(f64::MAX, f64::min);
            let difference = max - min;
            let detected = difference > self.config.format_mean_difference_max;
            let detail = format!(
                "mean quality spread {:.3} across {} formats {} limit {:.3}",
                difference,
                group_means.len(),
                if detected { "exceeds" } else { "within" },
                self.config.format_mean_difference_max
            );
            (difference, detected, detail)
        };

        BiasFinding {
            check_type: BiasCheckType::FormatBias,
            detected,
            statistic: BiasStatistic::MeanDifference(difference),
            detail,
            group_means: Some(group_means),
        }
    }

    /// Run every check in fixed order: size, then format.
    #[instrument(skip_all, fields(records = ledger.len()))]
    pub fn analyze(&self, ledger: &MetadataLedger) -> BiasReport {
        let records = ledger.records();
        let findings = vec![self.check_size_bias(records), self.check_format_bias(records)];
        for finding in &findings {
            BiasMetrics::record_finding(
                finding.check_type.as_str(),
                finding.detected,
                finding.statistic.value(),
            );
        }
        let report = BiasReport::new(findings);
        info!(total_biases = report.total_biases, "Bias analysis complete");
        report
    }
}

impl Default for BiasDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` when fewer than two points or either column is constant.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::record;

    fn ledger(records: Vec<DocumentRecord>) -> MetadataLedger {
        MetadataLedger::from_records(records).ledger
    }

    #[test]
    fn test_format_bias_detected_for_jpg_png_gap() {
        let mut records: Vec<_> = (0..7)
            .map(|i| record(&format!("j{}", i), "jpg", 1000 + i, 0.9))
            .collect();
        records.extend((0..3).map(|i| record(&format!("p{}", i), "png", 2000 + i, 0.5)));

        let finding = BiasDetector::new().check_format_bias(&records);
        assert!(finding.detected);
        assert!((finding.statistic.value() - 0.4).abs() < 1e-9);
        let means = finding.group_means.unwrap();
        assert_eq!(means.keys().collect::<Vec<_>>(), vec!["jpg", "png"]);
    }

    #[test]
    fn test_perfect_correlation_detected() {
        let records: Vec<_> = (1..=6)
            .map(|i| record(&format!("d{}", i), "jpg", i * 1000, i as f64 / 10.0))
            .collect();
        let finding = BiasDetector::new().check_size_bias(&records);
        assert!(finding.detected);
        assert!((finding.statistic.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_degrade_to_not_detected() {
        let detector = BiasDetector::new();

        let single = vec![record("only", "jpg", 10, 0.5)];
        let size = detector.check_size_bias(&single);
        assert!(!size.detected);
        assert_eq!(size.statistic, BiasStatistic::Correlation(0.0));

        let constant: Vec<_> = (0..4).map(|i| record(&format!("c{}", i), "png", 500, 0.2 * i as f64)).collect();
        assert_eq!(detector.check_size_bias(&constant).statistic.value(), 0.0);

        let one_group = detector.check_format_bias(&constant);
        assert!(!one_group.detected);
        assert_eq!(one_group.statistic, BiasStatistic::MeanDifference(0.0));

        let empty = detector.analyze(&MetadataLedger::new());
        assert_eq!(empty.total_biases, 0);
        assert_eq!(empty.biases.len(), 2);
    }

    #[test]
    fn test_report_order_and_json_shape() {
        let report = BiasDetector::new().analyze(&ledger(vec![
            record("a", "jpg", 100, 0.9),
            record("b", "png", 300, 0.2),
            record("c", "jpg", 200, 0.8),
        ]));
        assert_eq!(report.biases[0].check_type, BiasCheckType::SizeBias);
        assert_eq!(report.biases[1].check_type, BiasCheckType::FormatBias);
        assert_eq!(report.total_biases, report.detected().count());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["biases"][0]["type"], "size_bias");
        assert!(json["biases"][0]["correlation"].is_number());
        assert!(json["biases"][0].get("group_means").is_none());
        assert_eq!(json["biases"][1]["type"], "format_bias");
        assert!(json["biases"][1]["mean_difference"].is_number());

        let back: BiasReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let records = vec![record("a", "jpg", 1, 0.6), record("b", "png", 2, 0.4)];
        let strict = BiasDetector::with_config(BiasConfig {
            size_correlation_max: 0.7,
            format_mean_difference_max: 0.1,
        });
        assert!(strict.check_format_bias(&records).detected);
        assert!(!BiasDetector::new().check_format_bias(&records).detected);
    }
}
