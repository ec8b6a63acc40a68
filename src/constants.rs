//! Artifact names and shared column lists. These keep the ledger, split
//! tables and the downstream feature schema consistent with each other.

/// Ledger columns in persisted order.
pub const LEDGER_COLUMNS: [&str; 13] = [
    "doc_id",
    "source_path",
    "doc_type",
    "file_format",
    "file_size_bytes",
    "image_width",
    "image_height",
    "dpi",
    "quality_score",
    "has_blur",
    "vendor",
    "timestamp",
    "checksum",
];

/// Label table columns in persisted order.
pub const LABEL_COLUMNS: [&str; 7] = [
    "doc_id",
    "label_path",
    "company",
    "date",
    "total_raw",
    "total",
    "has_all",
];

/// Feature columns the downstream classifier is trained and served on.
pub const FEATURE_COLUMNS: [&str; 8] = [
    "file_size_bytes",
    "image_width",
    "image_height",
    "quality_score",
    "has_blur",
    "aspect_ratio",
    "pixel_count",
    "size_per_pixel",
];

/// Quality classes, lowest first.
pub const QUALITY_CLASSES: [&str; 3] = ["low", "medium", "high"];

/// Extensions treated as scanned documents.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Extensions probed, in order, for a document's label file.
pub const LABEL_EXTENSIONS: [&str; 2] = ["txt", "json"];

pub const LEDGER_FILE: &str = "all_metadata.csv";
pub const LABELS_FILE: &str = "labels.csv";
pub const FEATURES_FILE: &str = "features.csv";
pub const DATA_CARD_FILE: &str = "DATA_CARD.json";
pub const FEATURE_SCHEMA_FILE: &str = "feature_schema.json";
pub const TRAIN_FILE: &str = "train_metadata.csv";
pub const VAL_FILE: &str = "val_metadata.csv";
pub const TEST_FILE: &str = "test_metadata.csv";
pub const BIAS_REPORT_FILE: &str = "bias_analysis_report.json";
pub const ALERT_LOG_FILE: &str = "alerts.json";

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const CONFIG_PATH_ENV: &str = "LEDGERX_CONFIG";
