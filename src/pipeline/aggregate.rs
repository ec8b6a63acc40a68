use serde::{Deserialize, Serialize};

use crate::constants::LEDGER_COLUMNS;
use crate::pipeline::ledger::MetadataLedger;

/// Aggregate data quality metrics checked by the alerting engine.
///
/// Every rate is optional: an absent metric was not measured and is not
/// checked against its threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetrics {
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_values_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_rate: Option<f64>,
}

impl LedgerMetrics {
    /// Compute all metrics for `ledger`. `rejected_duplicates` is the number
    /// of inserts rejected while the ledger was built.
    pub fn from_ledger(ledger: &MetadataLedger, rejected_duplicates: usize) -> Self {
        let records = ledger.records();
        let n = records.len();
        let seen = n + rejected_duplicates;

        if n == 0 {
            return Self {
                document_count: 0,
                duplicate_rate: (seen > 0).then_some(1.0),
                ..Self::default()
            };
        }

        let total_quality: f64 = records.iter().map(|r| r.quality_score).sum();
        let blurred = records.iter().filter(|r| r.has_blur).count();
        let missing: usize = records.iter().map(|r| r.missing_cells()).sum();
        let cells = n * LEDGER_COLUMNS.len();

        Self {
            document_count: n,
            avg_quality_score: Some(total_quality / n as f64),
            blur_rate: Some(blurred as f64 / n as f64),
            missing_values_rate: Some(missing as f64 / cells as f64),
            duplicate_rate: Some(rejected_duplicates as f64 / seen as f64),
        }
    }
}
