use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Quality assessment failed for {path}: {reason}")]
    QualityAssessment { path: String, reason: String },

    #[error("Duplicate checksum {checksum}: '{doc_id}' has the same content as '{existing_doc_id}'")]
    DuplicateChecksum {
        checksum: String,
        doc_id: String,
        existing_doc_id: String,
    },

    #[error("Ledger invariants violated ({} violations): {}", .0.len(), summarize(.0))]
    InvariantViolation(Vec<Violation>),

    #[error("No complete records available to split")]
    EmptyDataset,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single ledger invariant violation found by `MetadataLedger::validate`.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MissingDocId { row: usize },
    QualityOutOfRange { doc_id: String, value: f64 },
    DuplicateChecksum { checksum: String, doc_ids: Vec<String> },
    DuplicateDocId { doc_id: String, rows: Vec<usize> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingDocId { row } => write!(f, "row {} has an empty doc_id", row),
            Violation::QualityOutOfRange { doc_id, value } => {
                write!(f, "{} has quality_score {} outside [0, 1]", doc_id, value)
            }
            Violation::DuplicateChecksum { checksum, doc_ids } => {
                write!(f, "checksum {} shared by {}", checksum, doc_ids.join(", "))
            }
            Violation::DuplicateDocId { doc_id, rows } => {
                let rows: Vec<String> = rows.iter().map(ToString::to_string).collect();
                write!(f, "doc_id {} repeated in rows {}", doc_id, rows.join(", "))
            }
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
