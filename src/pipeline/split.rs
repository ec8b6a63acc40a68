//! Seeded train/validation/test partitioning.
//!
//! Two stages, both driven by the same seed: the complete records are
//! shuffled and the first `ceil(n * train)` become train; the remainder is
//! shuffled again and the first `ceil(rest * val / (val + test))` become
//! validation, the rest test. Rounding up at each stage means leftovers favor
//! the earlier stage.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, instrument};

use crate::config::SplitConfig;
use crate::constants::{TEST_FILE, TRAIN_FILE, VAL_FILE};
use crate::domain::{DocumentRecord, ReceiptLabels};
use crate::error::{PipelineError, Result};
use crate::metrics::SplitMetrics;
use crate::pipeline::ledger::{MetadataLedger, Table};

/// Absorbs float noise such as `100 * 0.7 = 70.00000000000001` before `ceil`.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Decides whether a record may take part in a split.
pub trait Completeness {
    fn is_complete(&self, record: &DocumentRecord) -> bool;
}

/// Every required metadata field is present and well-formed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredMetadata;

impl Completeness for RequiredMetadata {
    fn is_complete(&self, record: &DocumentRecord) -> bool {
        !record.doc_id.trim().is_empty()
            && !record.checksum.trim().is_empty()
            && record.file_size_bytes > 0
            && record.image_width > 0
            && record.image_height > 0
    }
}

/// Required metadata plus complete receipt labels (company, date and total).
#[derive(Debug, Clone, Default)]
pub struct LabeledReceipts {
    complete_ids: HashSet<String>,
}

impl LabeledReceipts {
    pub fn new(labels: &[ReceiptLabels]) -> Self {
        Self {
            complete_ids: labels
                .iter()
                .filter(|l| l.has_all)
                .map(|l| l.doc_id.clone())
                .collect(),
        }
    }
}

impl Completeness for LabeledReceipts {
    fn is_complete(&self, record: &DocumentRecord) -> bool {
        RequiredMetadata.is_complete(record) && self.complete_ids.contains(&record.doc_id)
    }
}

/// Disjoint, exhaustive partition of the complete records of a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitAssignment {
    pub seed: u64,
    pub train: Vec<DocumentRecord>,
    pub validation: Vec<DocumentRecord>,
    pub test: Vec<DocumentRecord>,
    /// Incomplete records left out of every subset.
    pub excluded: Vec<String>,
}

impl SplitAssignment {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// Subset name for each assigned doc_id.
    pub fn membership(&self) -> HashMap<&str, &'static str> {
        let subsets = [
            ("train", &self.train),
            ("validation", &self.validation),
            ("test", &self.test),
        ];
        let mut membership = HashMap::new();
        for (name, records) in subsets {
            for record in records {
                membership.insert(record.doc_id.as_str(), name);
            }
        }
        membership
    }

    /// Write the three tables with the ledger schema into `dir`.
    pub fn write_tables(&self, dir: &Path) -> Result<()> {
        Table::from_records(&self.train).write_csv(&dir.join(TRAIN_FILE))?;
        Table::from_records(&self.validation).write_csv(&dir.join(VAL_FILE))?;
        Table::from_records(&self.test).write_csv(&dir.join(TEST_FILE))?;
        Ok(())
    }
}

/// Partition the complete records of `ledger` according to `config`.
#[instrument(skip_all, fields(seed = config.seed))]
pub fn split(
    ledger: &MetadataLedger,
    config: &SplitConfig,
    completeness: &dyn Completeness,
) -> Result<SplitAssignment> {
    config.validate()?;

    let (complete, incomplete): (Vec<&DocumentRecord>, Vec<&DocumentRecord>) = ledger
        .records()
        .iter()
        .partition(|r| completeness.is_complete(r));
    if complete.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    let n = complete.len();
    let n_train = stage_size(n, config.train);
    let (train, rest) = seeded_take(complete, n_train, config.seed);

    let held_out = config.val + config.test;
    let val_fraction = if held_out > 0.0 { config.val / held_out } else { 0.0 };
    let n_val = stage_size(rest.len(), val_fraction);
    let (validation, test) = seeded_take(rest, n_val, config.seed);

    let assignment = SplitAssignment {
        seed: config.seed,
        train: train.into_iter().cloned().collect(),
        validation: validation.into_iter().cloned().collect(),
        test: test.into_iter().cloned().collect(),
        excluded: incomplete.iter().map(|r| r.doc_id.clone()).collect(),
    };

    SplitMetrics::record_assignment(
        assignment.train.len(),
        assignment.validation.len(),
        assignment.test.len(),
        assignment.excluded.len(),
    );
    info!(
        train = assignment.train.len(),
        validation = assignment.validation.len(),
        test = assignment.test.len(),
        excluded = assignment.excluded.len(),
        "Split complete"
    );
    Ok(assignment)
}

/// `ceil(n * fraction)`, capped at `n`.
fn stage_size(n: usize, fraction: f64) -> usize {
    let exact = n as f64 * fraction;
    ((exact - ROUNDING_EPSILON).ceil().max(0.0) as usize).min(n)
}

/// Shuffle with a fresh RNG seeded by `seed`, then cut at `take`.
fn seeded_take<T>(mut items: Vec<T>, take: usize, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let rest = items.split_off(take.min(items.len()));
    (items, rest)
}
