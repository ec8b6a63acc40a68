//! Post-run verification of persisted artifacts.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::constants::{ALERT_LOG_FILE, BIAS_REPORT_FILE, LEDGER_FILE, TEST_FILE, TRAIN_FILE, VAL_FILE};
use crate::domain::DocumentRecord;
use crate::pipeline::alerts::read_alert_log;
use crate::pipeline::checksum::{checksum_file, is_valid_checksum};
use crate::pipeline::bias::BiasReport;
use crate::pipeline::ledger::{read_records_csv, MetadataLedger};
use crate::schema::{ReportKind, ReportValidator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Default, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    fn record(&mut self, name: &str, outcome: std::result::Result<String, String>) {
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        if passed {
            info!(check = name, %detail, "Check passed");
        } else {
            warn!(check = name, %detail, "Check failed");
        }
        self.checks.push(CheckResult {
            name: name.to_string(),
            passed,
            detail,
        });
    }
}

/// Re-read every artifact under the configured directories. Problems are
/// collected as failed checks; nothing here returns early.
pub fn verify_outputs(data: &DataConfig) -> VerificationReport {
    let mut report = VerificationReport::default();

    let ledger_path = data.processed_dir.join(LEDGER_FILE);
    let ledger = MetadataLedger::audit_csv(&ledger_path);
    let ledger_records: Option<Vec<DocumentRecord>> = match ledger {
        Ok((records, violations)) => {
            let outcome = if violations.is_empty() {
                Ok(format!("{} records, range-valid and checksum-unique", records.len()))
            } else {
                Err(violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "))
            };
            report.record("ledger", outcome);
            Some(records)
        }
        Err(e) => {
            report.record("ledger", Err(format!("{}: {}", ledger_path.display(), e)));
            None
        }
    };

    if let Some(records) = &ledger_records {
        report.record("source_integrity", check_sources(records));
    }
    let ledger_checksums: Option<HashSet<&str>> = ledger_records
        .as_ref()
        .map(|records| records.iter().map(|r| r.checksum.as_str()).collect());

    let mut owner: HashMap<String, &'static str> = HashMap::new();
    let mut overlaps = Vec::new();
    let mut unknown = 0usize;
    for (subset, file) in [("train", TRAIN_FILE), ("validation", VAL_FILE), ("test", TEST_FILE)] {
        let path = data.splits_dir.join(file);
        match read_records_csv(&path) {
            Ok(records) => {
                for record in &records {
                    if let Some(previous) = owner.insert(record.doc_id.clone(), subset) {
                        overlaps.push(format!("{} in {} and {}", record.doc_id, previous, subset));
                    }
                    if let Some(known) = &ledger_checksums {
                        if !known.contains(record.checksum.as_str()) {
                            unknown += 1;
                        }
                    }
                }
                report.record(subset, Ok(format!("{} records", records.len())));
            }
            Err(e) => report.record(subset, Err(format!("{}: {}", path.display(), e))),
        }
    }
    let partition = if !overlaps.is_empty() {
        Err(format!("overlapping subsets: {}", overlaps.join(", ")))
    } else if unknown > 0 {
        Err(format!("{} split records are not in the ledger", unknown))
    } else {
        Ok(format!("{} records across disjoint subsets", owner.len()))
    };
    report.record("split_partition", partition);

    let bias_path = data.reports_dir.join(BIAS_REPORT_FILE);
    report.record("bias_report", check_json(&bias_path, ReportKind::BiasReport, |p| {
        BiasReport::read_json(p).map(|r| format!("{} findings, {} detected", r.biases.len(), r.total_biases))
    }));
    let alert_path = data.reports_dir.join(ALERT_LOG_FILE);
    report.record("alert_log", check_json(&alert_path, ReportKind::AlertLog, |p| {
        read_alert_log(p).map(|events| format!("{} events", events.len()))
    }));

    report
}

/// Re-hash every source document still on disk and compare with the ledger.
fn check_sources(records: &[DocumentRecord]) -> std::result::Result<String, String> {
    let mut problems = Vec::new();
    let mut rehashed = 0usize;
    let mut missing = 0usize;
    for record in records {
        if !is_valid_checksum(&record.checksum) {
            problems.push(format!("{} has malformed checksum", record.doc_id));
            continue;
        }
        match checksum_file(Path::new(&record.source_path)) {
            Ok(actual) if actual == record.checksum => rehashed += 1,
            Ok(_) => problems.push(format!("{} content changed since assessment", record.doc_id)),
            Err(_) => missing += 1,
        }
    }
    if problems.is_empty() {
        Ok(format!("{} sources match, {} not on disk", rehashed, missing))
    } else {
        Err(problems.join("; "))
    }
}

/// Schema-check a report, then parse it into its typed form.
fn check_json(
    path: &Path,
    kind: ReportKind,
    read: impl FnOnce(&Path) -> crate::error::Result<String>,
) -> std::result::Result<String, String> {
    let errors = ReportValidator::bundled(kind)
        .and_then(|validator| validator.errors_in_file(path))
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    if !errors.is_empty() {
        return Err(format!("{} violates schema: {}", path.display(), errors.join("; ")));
    }
    read(path).map_err(|e| format!("{}: {}", path.display(), e))
}
