use serde::{Deserialize, Serialize};

/// One row of the metadata ledger. Created once per raw document during
/// assessment and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub source_path: String,
    pub doc_type: String,
    pub file_format: String,
    pub file_size_bytes: u64,
    pub image_width: u32,
    pub image_height: u32,
    pub dpi: Option<u32>,
    /// Normalized sharpness, always within [0, 1].
    pub quality_score: f64,
    pub has_blur: bool,
    pub vendor: Option<String>,
    /// RFC 3339 assessment time.
    pub timestamp: String,
    /// Lowercase hex SHA-256 of the document bytes.
    pub checksum: String,
}

impl DocumentRecord {
    /// Cells in `LEDGER_COLUMNS` order; absent optionals become empty cells.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.doc_id.clone(),
            self.source_path.clone(),
            self.doc_type.clone(),
            self.file_format.clone(),
            self.file_size_bytes.to_string(),
            self.image_width.to_string(),
            self.image_height.to_string(),
            self.dpi.map(|d| d.to_string()).unwrap_or_default(),
            self.quality_score.to_string(),
            self.has_blur.to_string(),
            self.vendor.clone().unwrap_or_default(),
            self.timestamp.clone(),
            self.checksum.clone(),
        ]
    }

    /// Number of cells that are absent or blank.
    pub fn missing_cells(&self) -> usize {
        let text_cells = [
            self.doc_id.as_str(),
            self.source_path.as_str(),
            self.doc_type.as_str(),
            self.file_format.as_str(),
            self.timestamp.as_str(),
            self.checksum.as_str(),
        ];
        let blank_text = text_cells.iter().filter(|c| c.trim().is_empty()).count();
        let absent_optional = usize::from(self.dpi.is_none())
            + usize::from(self.vendor.as_deref().map_or(true, |v| v.trim().is_empty()));
        blank_text + absent_optional
    }
}

/// Parsed receipt label fields for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLabels {
    pub doc_id: String,
    pub label_path: String,
    pub company: Option<String>,
    pub date: Option<String>,
    pub total_raw: Option<String>,
    pub total: Option<f64>,
    /// True when company, date and total are all present and non-empty.
    pub has_all: bool,
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use crate::constants::LEDGER_COLUMNS;

    #[test]
    fn test_row_matches_column_count() {
        let rec = record("r-1", "jpg", 1024, 0.8);
        assert_eq!(rec.to_row().len(), LEDGER_COLUMNS.len());
    }

    #[test]
    fn test_missing_cells_counts_absent_optionals() {
        let mut rec = record("r-1", "jpg", 1024, 0.8);
        assert_eq!(rec.missing_cells(), 0);
        rec.dpi = None;
        rec.vendor = Some("  ".to_string());
        assert_eq!(rec.missing_cells(), 2);
    }
}
