//! Receipt label files.
//!
//! Each scanned image may have a sibling `<stem>.txt` or `<stem>.json` file
//! holding a JSON object with `company`, `date` and `total` fields. Labels feed
//! the ledger's `vendor` column and the completeness check used before
//! splitting.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

use crate::constants::{LABEL_COLUMNS, LABEL_EXTENSIONS};
use crate::domain::ReceiptLabels;
use crate::error::Result;

#[derive(Debug, Default, Deserialize)]
struct RawLabel {
    company: Option<String>,
    date: Option<String>,
    total: Option<serde_json::Value>,
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-+]?\d*\.?\d+").expect("number pattern is valid"))
}

/// Parse a printed total such as `"RM 1,234.50"`: thousands separators are
/// dropped and the last number in the string wins.
pub fn normalize_total(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    number_pattern()
        .find_iter(&cleaned)
        .last()
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// First existing label file next to `image_path`.
pub fn find_label_file(image_path: &Path) -> Option<PathBuf> {
    LABEL_EXTENSIONS
        .iter()
        .map(|ext| image_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Parse label JSON text. Unparseable content yields labels with every field
/// absent rather than an error.
pub fn parse_labels(doc_id: &str, label_path: &str, content: &str) -> ReceiptLabels {
    let raw: RawLabel = match serde_json::from_str(content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(label_path, error = %e, "Failed to parse label file");
            RawLabel::default()
        }
    };

    let company = non_blank(raw.company);
    let date = non_blank(raw.date);
    let total_raw = match raw.total {
        Some(serde_json::Value::String(s)) => non_blank(Some(s)),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let total = total_raw.as_deref().and_then(normalize_total);
    // A zero total counts as missing, like an absent one
    let has_all = company.is_some() && date.is_some() && total.map_or(false, |t| t != 0.0);

    ReceiptLabels {
        doc_id: doc_id.to_string(),
        label_path: label_path.to_string(),
        company,
        date,
        total_raw,
        total,
        has_all,
    }
}

/// Read the labels for the document at `image_path`, if a label file exists.
pub fn read_labels_for(image_path: &Path, doc_id: &str) -> Option<ReceiptLabels> {
    let label_path = find_label_file(image_path)?;
    let label_str = label_path.display().to_string();
    match fs::read_to_string(&label_path) {
        Ok(content) => Some(parse_labels(doc_id, &label_str, &content)),
        Err(e) => {
            warn!(label_path = %label_str, error = %e, "Failed to read label file");
            Some(parse_labels(doc_id, &label_str, ""))
        }
    }
}

pub fn write_labels_csv(labels: &[ReceiptLabels], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(LABEL_COLUMNS)?;
    for label in labels {
        writer.write_record([
            label.doc_id.clone(),
            label.label_path.clone(),
            label.company.clone().unwrap_or_default(),
            label.date.clone().unwrap_or_default(),
            label.total_raw.clone().unwrap_or_default(),
            label.total.map(|t| t.to_string()).unwrap_or_default(),
            label.has_all.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Load labels written by `write_labels_csv`.
pub fn read_labels_csv(path: &Path) -> Result<Vec<ReceiptLabels>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut labels = Vec::new();
    for row in reader.deserialize() {
        labels.push(row?);
    }
    Ok(labels)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_total_takes_last_number() {
        assert_eq!(normalize_total("RM 1,234.50"), Some(1234.5));
        assert_eq!(normalize_total("9.00 TOTAL 12.30"), Some(12.3));
        assert_eq!(normalize_total(".75"), Some(0.75));
        assert_eq!(normalize_total("n/a"), None);
    }

    #[test]
    fn test_complete_labels() {
        let labels = parse_labels(
            "X001",
            "X001.txt",
            r#"{"company": "BOOK TA .K (TAMAN DAYA) SDN BHD", "date": "25/12/2018", "total": "9.00"}"#,
        );
        assert!(labels.has_all);
        assert_eq!(labels.total, Some(9.0));
        assert_eq!(labels.company.as_deref(), Some("BOOK TA .K (TAMAN DAYA) SDN BHD"));
    }

    #[test]
    fn test_missing_or_zero_total_is_incomplete() {
        let missing = parse_labels("a", "a.txt", r#"{"company": "A", "date": "01/01/2019"}"#);
        assert!(!missing.has_all);
        let zero = parse_labels("b", "b.txt", r#"{"company": "B", "date": "01/01/2019", "total": "0.00"}"#);
        assert!(!zero.has_all);
        let blank_company = parse_labels("c", "c.txt", r#"{"company": "  ", "date": "x", "total": 3}"#);
        assert!(!blank_company.has_all);
    }

    #[test]
    fn test_unparseable_label_is_incomplete() {
        let labels = parse_labels("d", "d.txt", "company: nope");
        assert!(!labels.has_all);
        assert!(labels.company.is_none());
    }

    #[test]
    fn test_label_file_lookup() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("X002.jpg");
        assert!(read_labels_for(&image, "X002").is_none());

        fs::write(dir.path().join("X002.txt"), r#"{"company": "SHOP", "date": "d", "total": "5"}"#).unwrap();
        let labels = read_labels_for(&image, "X002").unwrap();
        assert!(labels.has_all);
        assert_eq!(labels.doc_id, "X002");
    }

    #[test]
    fn test_labels_csv_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        let labels = vec![
            parse_labels("a", "a.txt", r#"{"company": "A", "date": "d", "total": "RM 3.50"}"#),
            parse_labels("b", "b.txt", r#"{"company": "B"}"#),
        ];
        write_labels_csv(&labels, &path).unwrap();
        assert_eq!(read_labels_csv(&path).unwrap(), labels);
    }
}
