//! Feature schema and data card artifacts.
//!
//! The feature schema pins the column order and class labels the downstream
//! training and serving code agree on. The data card summarizes one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::constants::{FEATURE_COLUMNS, QUALITY_CLASSES};
use crate::domain::DocumentRecord;
use crate::error::Result;
use crate::pipeline::aggregate::LedgerMetrics;

/// Model inputs derived from one ledger record, in `FEATURE_COLUMNS` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; 8]);

impl FeatureVector {
    pub fn from_record(record: &DocumentRecord) -> Self {
        let width = record.image_width as f64;
        let height = record.image_height as f64;
        let pixel_count = width * height;
        let size = record.file_size_bytes as f64;
        Self([
            size,
            width,
            height,
            record.quality_score,
            if record.has_blur { 1.0 } else { 0.0 },
            if height > 0.0 { width / height } else { 0.0 },
            pixel_count,
            if pixel_count > 0.0 { size / pixel_count } else { 0.0 },
        ])
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        FEATURE_COLUMNS
            .iter()
            .position(|c| *c == feature)
            .map(|i| self.0[i])
    }
}

/// Three equal-width bins over the observed quality range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBins {
    pub min: f64,
    pub max: f64,
}

impl QualityBins {
    pub fn from_records(records: &[DocumentRecord]) -> Option<Self> {
        let mut scores = records.iter().map(|r| r.quality_score);
        let first = scores.next()?;
        let (min, max) = scores.fold((first, first), |(lo, hi), q| (lo.min(q), hi.max(q)));
        Some(Self { min, max })
    }

    /// Upper edges of the `low` and `medium` bins.
    pub fn edges(&self) -> [f64; 2] {
        let width = (self.max - self.min) / 3.0;
        [self.min + width, self.min + 2.0 * width]
    }

    pub fn classify(&self, quality_score: f64) -> &'static str {
        let width = (self.max - self.min) / 3.0;
        if width <= 0.0 {
            // A constant range sits in the middle bin
            return QUALITY_CLASSES[1];
        }
        let index = ((quality_score - self.min) / width).floor().clamp(0.0, 2.0) as usize;
        QUALITY_CLASSES[index]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub features: Vec<String>,
    pub classes: Vec<String>,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_bins: Option<QualityBins>,
}

impl FeatureSchema {
    pub fn for_records(records: &[DocumentRecord]) -> Self {
        Self {
            features: FEATURE_COLUMNS.iter().map(|f| f.to_string()).collect(),
            classes: QUALITY_CLASSES.iter().map(|c| c.to_string()).collect(),
            target: "quality_class".to_string(),
            quality_bins: QualityBins::from_records(records),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub seed: u64,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
    pub excluded: usize,
}

/// Summary of one pipeline run, written next to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCard {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub config_source: String,
    pub documents_assessed: usize,
    pub documents_excluded: usize,
    pub duplicates_rejected: usize,
    pub labeled_documents: usize,
    pub complete_labels: usize,
    pub metrics: LedgerMetrics,
    pub quality_classes: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitSummary>,
    pub total_biases: usize,
    pub alerts: usize,
}

/// Count of records per quality class; every class is present.
pub fn class_distribution(records: &[DocumentRecord]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> =
        QUALITY_CLASSES.iter().map(|c| (c.to_string(), 0)).collect();
    if let Some(bins) = QualityBins::from_records(records) {
        for record in records {
            *counts
                .entry(bins.classify(record.quality_score).to_string())
                .or_default() += 1;
        }
    }
    counts
}

/// One row per record: `doc_id`, the `FEATURE_COLUMNS`, then the quality
/// class under `bins`.
pub fn write_feature_csv(
    records: &[DocumentRecord],
    bins: Option<QualityBins>,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["doc_id"];
    header.extend(FEATURE_COLUMNS);
    header.push("quality_class");
    writer.write_record(&header)?;

    for record in records {
        let features = FeatureVector::from_record(record);
        let class = bins.map_or(QUALITY_CLASSES[1], |b| b.classify(record.quality_score));
        let mut row = Vec::with_capacity(header.len());
        row.push(record.doc_id.clone());
        row.extend(features.0.iter().map(ToString::to_string));
        row.push(class.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn read_data_card(path: &Path) -> Result<DataCard> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::record;

    #[test]
    fn test_derived_features() {
        let mut rec = record("a", "jpg", 400_000, 0.7);
        rec.image_width = 800;
        rec.image_height = 1000;
        let v = FeatureVector::from_record(&rec);
        assert_eq!(v.get("aspect_ratio"), Some(0.8));
        assert_eq!(v.get("pixel_count"), Some(800_000.0));
        assert_eq!(v.get("size_per_pixel"), Some(0.5));
        assert_eq!(v.get("has_blur"), Some(0.0));
        assert_eq!(v.get("unknown"), None);
    }

    #[test]
    fn test_equal_width_quality_bins() {
        let records = vec![
            record("a", "jpg", 1, 0.0),
            record("b", "jpg", 2, 0.5),
            record("c", "jpg", 3, 0.9),
        ];
        let bins = QualityBins::from_records(&records).unwrap();
        assert!((bins.edges()[0] - 0.3).abs() < 1e-12);
        assert_eq!(bins.classify(0.1), "low");
        assert_eq!(bins.classify(0.5), "medium");
        assert_eq!(bins.classify(0.9), "high");

        let counts = class_distribution(&records);
        assert_eq!(counts["low"], 1);
        assert_eq!(counts["medium"], 1);
        assert_eq!(counts["high"], 1);
    }

    #[test]
    fn test_constant_quality_is_medium() {
        let records = vec![record("a", "png", 1, 0.4), record("b", "png", 2, 0.4)];
        assert_eq!(class_distribution(&records)["medium"], 2);
        assert_eq!(class_distribution(&[])["low"], 0);
    }

    #[test]
    fn test_feature_table_rows_follow_schema() {
        let mut wide = record("wide", "jpg", 400_000, 0.9);
        wide.image_width = 800;
        wide.image_height = 1000;
        let records = vec![record("blurry", "png", 10, 0.0), wide];
        let schema = FeatureSchema::for_records(&records);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.csv");
        write_feature_csv(&records, schema.quality_bins, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header.len(), FEATURE_COLUMNS.len() + 2);
        assert_eq!(&header[1..=FEATURE_COLUMNS.len()], &schema.features[..]);
        assert_eq!(header.last().map(String::as_str), Some("quality_class"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][0], "blurry");
        assert_eq!(&rows[0][5], "1");
        assert_eq!(&rows[0][9], "low");
        assert_eq!(&rows[1][6], "0.8");
        assert_eq!(&rows[1][9], "high");
    }

    #[test]
    fn test_schema_lists_features_in_order() {
        let schema = FeatureSchema::for_records(&[]);
        assert_eq!(schema.features.len(), FEATURE_COLUMNS.len());
        assert_eq!(schema.features[0], "file_size_bytes");
        assert_eq!(schema.classes, vec!["low", "medium", "high"]);
        assert!(schema.quality_bins.is_none());
    }
}
