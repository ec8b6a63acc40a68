use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::constants::LEDGER_COLUMNS;
use crate::domain::DocumentRecord;
use crate::error::{PipelineError, Result, Violation};
use crate::metrics::LedgerPhaseMetrics;

/// Ordered, column-complete export of a set of document records.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DocumentRecord>) -> Self {
        Self {
            columns: LEDGER_COLUMNS.to_vec(),
            rows: records.into_iter().map(DocumentRecord::to_row).collect(),
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Canonical collection of document records for one corpus.
///
/// Records keep insertion order. A checksum can only be inserted once;
/// duplicate content is rejected, never overwritten.
#[derive(Debug, Default, Clone)]
pub struct MetadataLedger {
    records: Vec<DocumentRecord>,
    by_checksum: HashMap<String, usize>,
}

/// Outcome of building a ledger from an assessment batch.
#[derive(Debug, Default)]
pub struct LedgerBuild {
    pub ledger: MetadataLedger,
    /// `(doc_id, existing_doc_id)` for every rejected duplicate.
    pub rejected_duplicates: Vec<(String, String)>,
}

impl MetadataLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, rejecting it if its checksum is already present.
    pub fn add(&mut self, record: DocumentRecord) -> Result<()> {
        if let Some(&existing) = self.by_checksum.get(&record.checksum) {
            LedgerPhaseMetrics::record_duplicate_rejected();
            return Err(PipelineError::DuplicateChecksum {
                checksum: record.checksum,
                doc_id: record.doc_id,
                existing_doc_id: self.records[existing].doc_id.clone(),
            });
        }
        self.by_checksum
            .insert(record.checksum.clone(), self.records.len());
        self.records.push(record);
        LedgerPhaseMetrics::record_inserted();
        Ok(())
    }

    /// Insert every record in order; duplicates are logged and skipped.
    pub fn from_records(records: impl IntoIterator<Item = DocumentRecord>) -> LedgerBuild {
        let mut build = LedgerBuild::default();
        for record in records {
            match build.ledger.add(record) {
                Ok(()) => {}
                Err(PipelineError::DuplicateChecksum {
                    checksum,
                    doc_id,
                    existing_doc_id,
                }) => {
                    warn!(%checksum, %doc_id, %existing_doc_id, "Rejected duplicate document");
                    build.rejected_duplicates.push((doc_id, existing_doc_id));
                }
                Err(e) => warn!(error = %e, "Unexpected ledger insert failure"),
            }
        }
        LedgerPhaseMetrics::record_size(build.ledger.len());
        info!(
            records = build.ledger.len(),
            duplicates = build.rejected_duplicates.len(),
            "Ledger built"
        );
        build
    }

    /// Scan all records and report every invariant violation at once.
    pub fn validate(&self) -> Result<()> {
        let violations = collect_violations(&self.records);
        if violations.is_empty() {
            debug!(records = self.records.len(), "Ledger validation passed");
            return Ok(());
        }
        LedgerPhaseMetrics::record_violations(violations.len());
        Err(PipelineError::InvariantViolation(violations))
    }

    pub fn to_table(&self) -> Table {
        Table::from_records(&self.records)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.to_table().write_csv(path)
    }

    /// Audit a persisted ledger table. Rows are loaded as-is, without
    /// deduplication, so the returned violations describe the file.
    pub fn audit_csv(path: &Path) -> Result<(Vec<DocumentRecord>, Vec<Violation>)> {
        let records = read_records_csv(path)?;
        let violations = collect_violations(&records);
        Ok((records, violations))
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load document records from a table written by `Table::write_csv`.
pub fn read_records_csv(path: &Path) -> Result<Vec<DocumentRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

fn collect_violations(records: &[DocumentRecord]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut checksums: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut doc_ids: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

    for (row, record) in records.iter().enumerate() {
        if record.doc_id.trim().is_empty() {
            violations.push(Violation::MissingDocId { row });
        }
        if !(0.0..=1.0).contains(&record.quality_score) {
            violations.push(Violation::QualityOutOfRange {
                doc_id: record.doc_id.clone(),
                value: record.quality_score,
            });
        }
        checksums
            .entry(record.checksum.as_str())
            .or_default()
            .push(record.doc_id.clone());
        if !record.doc_id.trim().is_empty() {
            doc_ids.entry(record.doc_id.as_str()).or_default().push(row);
        }
    }

    for (doc_id, rows) in doc_ids {
        if rows.len() > 1 {
            violations.push(Violation::DuplicateDocId {
                doc_id: doc_id.to_string(),
                rows,
            });
        }
    }

    for (checksum, doc_ids) in checksums {
        if doc_ids.len() > 1 {
            violations.push(Violation::DuplicateChecksum {
                checksum: checksum.to_string(),
                doc_ids,
            });
        }
    }
    violations
}
