use image::{GrayImage, Luma};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

use ledgerx_pipeline::config::{DataConfig, PipelineConfig};
use ledgerx_pipeline::constants::{
    ALERT_LOG_FILE, BIAS_REPORT_FILE, DATA_CARD_FILE, FEATURES_FILE, FEATURE_SCHEMA_FILE,
    LABELS_FILE, LEDGER_FILE, TEST_FILE, TRAIN_FILE, VAL_FILE,
};
use ledgerx_pipeline::error::PipelineError;
use ledgerx_pipeline::pipeline::alerts::read_alert_log;
use ledgerx_pipeline::pipeline::ledger::read_records_csv;
use ledgerx_pipeline::pipeline::{verify_outputs, AlertPayload, BiasReport, Pipeline, RunContext};

fn checkerboard(size: u32, invert: bool) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
        let on = (x + y) % 2 == 0;
        Luma([if on != invert { 255 } else { 0 }])
    })
}

fn save(img: &GrayImage, path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    img.save(path).unwrap();
}

/// Corpus of four unique scans, one byte-identical duplicate and one
/// corrupt file.
fn corpus() -> (TempDir, PipelineConfig) {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");

    save(&checkerboard(32, false), &raw.join("receipts/sharp_a.png"));
    save(&checkerboard(32, true), &raw.join("receipts/sharp_b.png"));
    save(&GrayImage::from_pixel(32, 32, Luma([128])), &raw.join("receipts/flat_c.png"));
    fs::copy(raw.join("receipts/flat_c.png"), raw.join("receipts/flat_c_copy.png")).unwrap();
    save(&checkerboard(16, false), &raw.join("invoices/sharp_d.png"));
    fs::write(raw.join("receipts/broken.png"), b"\x89PNG but not really").unwrap();
    fs::write(
        raw.join("receipts/sharp_a.txt"),
        r#"{"company": "UNIHAKKA INTERNATIONAL SDN BHD", "date": "19/06/2018", "total": "8.70"}"#,
    )
    .unwrap();

    let config = PipelineConfig {
        data: DataConfig {
            raw_dir: raw,
            processed_dir: dir.path().join("processed"),
            splits_dir: dir.path().join("splits"),
            reports_dir: dir.path().join("reports"),
            ..DataConfig::default()
        },
        ..PipelineConfig::default()
    };
    (dir, config)
}

fn data_quality_violations(path: &Path) -> Vec<String> {
    read_alert_log(path)
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.payload {
            AlertPayload::DataQuality { violations } => Some(violations),
            AlertPayload::PipelineFailure { .. } => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn full_run_writes_every_artifact() {
    let (_dir, config) = corpus();
    let data = config.data.clone();
    let mut ctx = RunContext::with_config(config);

    let result = Pipeline::run(&mut ctx).await.unwrap();
    assert_eq!(result.documents_assessed, 5);
    assert_eq!(result.documents_excluded, 1);
    assert_eq!(result.ledger_records, 4);
    assert_eq!(result.duplicates_rejected, 1);

    for path in [
        data.processed_dir.join(LEDGER_FILE),
        data.processed_dir.join(LABELS_FILE),
        data.processed_dir.join(DATA_CARD_FILE),
        data.processed_dir.join(FEATURE_SCHEMA_FILE),
        data.processed_dir.join(FEATURES_FILE),
        data.splits_dir.join(TRAIN_FILE),
        data.splits_dir.join(VAL_FILE),
        data.splits_dir.join(TEST_FILE),
        data.reports_dir.join(BIAS_REPORT_FILE),
        data.reports_dir.join(ALERT_LOG_FILE),
    ] {
        assert!(path.is_file(), "missing {}", path.display());
    }

    let ledger = read_records_csv(&data.processed_dir.join(LEDGER_FILE)).unwrap();
    let ids: Vec<_> = ledger.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["invoices_sharp_d", "receipts_flat_c", "receipts_sharp_a", "receipts_sharp_b"]
    );
    let flat = &ledger[1];
    assert!(flat.has_blur);
    assert_eq!(flat.quality_score, 0.0);
    let sharp = &ledger[2];
    assert!(!sharp.has_blur);
    assert_eq!(sharp.quality_score, 1.0);
    assert_eq!(sharp.vendor.as_deref(), Some("UNIHAKKA INTERNATIONAL SDN BHD"));
    assert_eq!(sharp.doc_type, "receipts");
    assert_eq!(ledger[0].doc_type, "invoices");

    // One blurred scan in four and one duplicate in five both breach defaults
    let violations = data_quality_violations(&data.reports_dir.join(ALERT_LOG_FILE));
    assert!(violations.iter().any(|v| v.starts_with("Blur rate 0.250")));
    assert!(violations.iter().any(|v| v.starts_with("Duplicate rate 0.200")));
    assert!(!violations.iter().any(|v| v.starts_with("Quality score")));

    let report = BiasReport::read_json(&data.reports_dir.join(BIAS_REPORT_FILE)).unwrap();
    assert_eq!(report.biases.len(), 2);
    assert!(!report.biases[1].detected, "single format cannot show format bias");

    let verification = verify_outputs(&data);
    assert!(
        verification.passed(),
        "failed checks: {:?}",
        verification.failures().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn split_tables_partition_the_ledger() {
    let (_dir, config) = corpus();
    let data = config.data.clone();
    let mut ctx = RunContext::with_config(config);
    let result = Pipeline::run(&mut ctx).await.unwrap();

    let split = result.split.unwrap();
    assert_eq!((split.train, split.validation, split.test), (3, 1, 0));

    let mut seen = HashSet::new();
    for file in [TRAIN_FILE, VAL_FILE, TEST_FILE] {
        for record in read_records_csv(&data.splits_dir.join(file)).unwrap() {
            assert!(seen.insert(record.doc_id), "record in two subsets");
        }
    }
    assert_eq!(seen.len(), result.ledger_records);
}

#[tokio::test]
async fn resplitting_with_same_seed_is_reproducible() {
    let (_dir, config) = corpus();
    let data = config.data.clone();
    let mut first = RunContext::with_config(config.clone());
    Pipeline::run_assess(&mut first).await.unwrap();

    let mut ctx = RunContext::with_config(config.clone());
    Pipeline::run_split(&mut ctx).unwrap();
    let train_a = fs::read_to_string(data.splits_dir.join(TRAIN_FILE)).unwrap();

    let mut ctx = RunContext::with_config(config);
    let result = Pipeline::run_split(&mut ctx).unwrap();
    let train_b = fs::read_to_string(data.splits_dir.join(TRAIN_FILE)).unwrap();

    assert_eq!(train_a, train_b);
    assert_eq!(result.split.unwrap().seed, 42);
}

#[tokio::test]
async fn failed_stage_is_recorded_before_propagating() {
    let (_dir, mut config) = corpus();
    // Without its label file no scan has complete labels
    config.split.require_labels = true;
    fs::remove_file(config.data.raw_dir.join("receipts/sharp_a.txt")).unwrap();
    let data = config.data.clone();

    let mut ctx = RunContext::with_config(config);
    let err = Pipeline::run(&mut ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyDataset));

    let events = read_alert_log(&data.reports_dir.join(ALERT_LOG_FILE)).unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        AlertPayload::PipelineFailure { stage, error } => {
            assert_eq!(stage, "split");
            assert!(error.contains("No complete records"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    // Stages before the failure still persisted their artifacts
    assert!(data.processed_dir.join(LEDGER_FILE).is_file());
    assert!(!data.reports_dir.join(BIAS_REPORT_FILE).exists());
}

#[tokio::test]
async fn failed_data_card_write_is_recorded() {
    let (_dir, config) = corpus();
    let data = config.data.clone();
    // A directory in the data card's place makes the final write fail
    fs::create_dir_all(data.processed_dir.join(DATA_CARD_FILE)).unwrap();

    let mut ctx = RunContext::with_config(config);
    let err = Pipeline::run(&mut ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));

    let failures: Vec<_> = read_alert_log(&data.reports_dir.join(ALERT_LOG_FILE))
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.payload {
            AlertPayload::PipelineFailure { stage, .. } => Some(stage),
            AlertPayload::DataQuality { .. } => None,
        })
        .collect();
    assert_eq!(failures, vec!["persist".to_string()]);
}

#[tokio::test]
async fn same_stem_in_two_formats_keeps_distinct_doc_ids() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    save(&checkerboard(16, false), &raw.join("receipts/x.png"));
    save(&checkerboard(16, true), &raw.join("receipts/x.bmp"));
    save(&checkerboard(12, false), &raw.join("a/b_c.png"));
    save(&checkerboard(20, false), &raw.join("a_b/c.png"));
    let config = PipelineConfig {
        data: DataConfig {
            raw_dir: raw,
            processed_dir: dir.path().join("processed"),
            reports_dir: dir.path().join("reports"),
            ..DataConfig::default()
        },
        ..PipelineConfig::default()
    };
    let data = config.data.clone();

    let mut ctx = RunContext::with_config(config);
    Pipeline::run_assess(&mut ctx).await.unwrap();

    let ledger = read_records_csv(&data.processed_dir.join(LEDGER_FILE)).unwrap();
    let ids: HashSet<_> = ledger.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ledger.len(), 4);
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn missing_raw_directory_fails_assessment() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig {
        data: DataConfig {
            raw_dir: dir.path().join("nowhere"),
            reports_dir: dir.path().join("reports"),
            ..DataConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut ctx = RunContext::with_config(config);
    let err = Pipeline::run(&mut ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(ctx.alerts.len(), 1);
}
