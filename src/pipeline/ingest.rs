use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::DataConfig;
use crate::constants::IMAGE_EXTENSIONS;
use crate::domain::{DocumentRecord, ReceiptLabels};
use crate::error::{PipelineError, Result};
use crate::metrics::AssessMetrics;
use crate::pipeline::assess::QualityAssessor;
use crate::pipeline::labels::read_labels_for;

/// A document left out of the ledger because it could not be assessed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedDocument {
    pub source_path: String,
    pub reason: String,
}

/// Result of assessing a raw corpus. `records` and `labels` are sorted by
/// `doc_id` so downstream stages see the same order regardless of how the
/// assessments were scheduled.
#[derive(Debug, Default)]
pub struct AssessmentBatch {
    pub records: Vec<DocumentRecord>,
    pub labels: Vec<ReceiptLabels>,
    pub excluded: Vec<ExcludedDocument>,
}

/// All scanned documents under `raw_dir`, sorted by path.
pub fn discover_documents(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "Raw data directory not found: {}",
            raw_dir.display()
        )));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(raw_dir).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Relative path without extension, separators replaced by `_`.
pub fn derive_doc_id(raw_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(raw_dir).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_")
}

/// Pair every path with a doc_id that is unique within `paths`.
///
/// Paths keep the plain `derive_doc_id` form unless it collides. Colliding
/// paths (`x.png` next to `x.bmp`, or `a/b_c.png` next to `a_b/c.png`) take
/// their extension as a suffix, then a numeric suffix if still taken. The
/// result depends only on the set of paths.
pub fn assign_doc_ids(raw_dir: &Path, paths: &[PathBuf]) -> Vec<(PathBuf, String)> {
    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();
    let bases: Vec<String> = sorted.iter().map(|p| derive_doc_id(raw_dir, p)).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for base in &bases {
        *counts.entry(base.as_str()).or_default() += 1;
    }
    let mut taken: HashSet<String> = bases
        .iter()
        .filter(|b| counts[b.as_str()] == 1)
        .cloned()
        .collect();

    let mut assigned = Vec::with_capacity(sorted.len());
    for (path, base) in sorted.into_iter().zip(bases.iter()) {
        if counts[base.as_str()] == 1 {
            assigned.push((path.clone(), base.clone()));
            continue;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let stem = format!("{}_{}", base, extension);
        let mut candidate = stem.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", stem, n);
            n += 1;
        }
        debug!(path = %path.display(), doc_id = %candidate, "Disambiguated doc_id");
        taken.insert(candidate.clone());
        assigned.push((path.clone(), candidate));
    }
    assigned
}

/// First directory below `raw_dir`, or `default` for top-level files.
pub fn derive_doc_type(raw_dir: &Path, path: &Path, default: &str) -> String {
    let relative = path.strip_prefix(raw_dir).unwrap_or(path);
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(first), Some(_)) => first.as_os_str().to_string_lossy().into_owned(),
        _ => default.to_string(),
    }
}

/// Assess a single document file into a ledger record plus its labels.
pub fn assess_document(
    path: &Path,
    doc_id: String,
    data: &DataConfig,
    assessor: &dyn QualityAssessor,
) -> Result<(DocumentRecord, Option<ReceiptLabels>)> {
    let source_path = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| PipelineError::QualityAssessment {
        path: source_path.clone(),
        reason: e.to_string(),
    })?;
    let assessment = assessor.assess(&source_path, &bytes)?;

    let labels = read_labels_for(path, &doc_id);
    let vendor = labels.as_ref().and_then(|l| l.company.clone());

    let record = DocumentRecord {
        doc_type: derive_doc_type(&data.raw_dir, path, &data.default_doc_type),
        file_format: path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default(),
        file_size_bytes: bytes.len() as u64,
        image_width: assessment.width,
        image_height: assessment.height,
        dpi: assessment.dpi,
        quality_score: assessment.quality_score,
        has_blur: assessment.has_blur,
        vendor,
        timestamp: Utc::now().to_rfc3339(),
        checksum: assessment.checksum,
        doc_id,
        source_path,
    };
    Ok((record, labels))
}

/// Assess every document under `data.raw_dir`, at most `workers` at a time.
/// Unreadable documents are excluded and logged; they never abort the batch.
#[instrument(skip_all, fields(raw_dir = %data.raw_dir.display()))]
pub async fn assess_corpus(
    data: &DataConfig,
    assessor: Arc<dyn QualityAssessor + Send + Sync>,
    workers: usize,
) -> Result<AssessmentBatch> {
    let paths = discover_documents(&data.raw_dir)?;
    info!("Discovered {} documents", paths.len());
    let documents = assign_doc_ids(&data.raw_dir, &paths);

    let mut batch = AssessmentBatch::default();
    for chunk in documents.chunks(workers.max(1)) {
        let mut tasks = JoinSet::new();
        for (path, doc_id) in chunk {
            let path = path.clone();
            let doc_id = doc_id.clone();
            let data = data.clone();
            let assessor = Arc::clone(&assessor);
            tasks.spawn_blocking(move || {
                let outcome = assess_document(&path, doc_id, &data, assessor.as_ref());
                (path, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok((record, labels)))) => {
                    debug!(doc_id = %record.doc_id, quality_score = record.quality_score, "Assessed");
                    AssessMetrics::record_assessed(record.quality_score, record.has_blur);
                    batch.records.push(record);
                    batch.labels.extend(labels);
                }
                Ok((path, Err(e))) => {
                    warn!(path = %path.display(), error = %e, "Excluding document");
                    AssessMetrics::record_excluded();
                    batch.excluded.push(ExcludedDocument {
                        source_path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Assessment task failed");
                    AssessMetrics::record_excluded();
                    batch.excluded.push(ExcludedDocument {
                        source_path: String::from("<unknown>"),
                        reason: join_error.to_string(),
                    });
                }
            }
        }
    }

    batch.records.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    batch.labels.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    batch.excluded.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    info!(
        assessed = batch.records.len(),
        excluded = batch.excluded.len(),
        "Assessment complete"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assess::LaplacianAssessor;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn write_png(path: &Path, gray: &GrayImage) {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray.clone())
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, out.into_inner()).unwrap();
    }

    #[test]
    fn test_doc_id_and_type_derivation() {
        let root = Path::new("/data/raw");
        let nested = Path::new("/data/raw/receipts/2019/X01.jpg");
        assert_eq!(derive_doc_id(root, nested), "receipts_2019_X01");
        assert_eq!(derive_doc_type(root, nested, "receipt"), "receipts");

        let top = Path::new("/data/raw/X02.png");
        assert_eq!(derive_doc_id(root, top), "X02");
        assert_eq!(derive_doc_type(root, top, "receipt"), "receipt");
    }

    #[test]
    fn test_colliding_paths_get_distinct_doc_ids() {
        let root = Path::new("/data/raw");
        let paths: Vec<PathBuf> = [
            "receipts/x.png",
            "receipts/x.bmp",
            "a/b_c.png",
            "a_b/c.png",
            "receipts/x_png.jpg",
            "receipts/y.jpg",
        ]
        .iter()
        .map(|p| root.join(p))
        .collect();

        let assigned = assign_doc_ids(root, &paths);
        let id_of = |rel: &str| {
            assigned
                .iter()
                .find(|(p, _)| *p == root.join(rel))
                .map(|(_, id)| id.as_str())
                .unwrap()
        };
        assert_eq!(id_of("receipts/y.jpg"), "receipts_y");
        assert_eq!(id_of("receipts/x_png.jpg"), "receipts_x_png");
        assert_eq!(id_of("receipts/x.bmp"), "receipts_x_bmp");
        assert_eq!(id_of("receipts/x.png"), "receipts_x_png_2");
        assert_eq!(id_of("a/b_c.png"), "a_b_c_png");
        assert_eq!(id_of("a_b/c.png"), "a_b_c_png_2");

        let unique: HashSet<_> = assigned.iter().map(|(_, id)| id).collect();
        assert_eq!(unique.len(), paths.len());

        let mut reversed = paths.clone();
        reversed.reverse();
        assert_eq!(assign_doc_ids(root, &reversed), assigned);
    }

    #[tokio::test]
    async fn test_same_stem_in_two_formats_stays_two_records() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw");
        let scan = GrayImage::from_fn(8, 8, |x, y| Luma([((x + y) * 15) as u8]));
        write_png(&raw.join("receipts/x.png"), &scan);
        DynamicImage::ImageLuma8(scan).save(raw.join("receipts/x.bmp")).unwrap();
        write_png(&raw.join("a/b_c.png"), &GrayImage::from_pixel(8, 8, Luma([10])));
        write_png(&raw.join("a_b/c.png"), &GrayImage::from_pixel(8, 8, Luma([200])));

        let data = DataConfig {
            raw_dir: raw,
            ..DataConfig::default()
        };
        let batch = assess_corpus(&data, Arc::new(LaplacianAssessor::new()), 4)
            .await
            .unwrap();

        let ids: Vec<_> = batch.records.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a_b_c_png", "a_b_c_png_2", "receipts_x_bmp", "receipts_x_png"]);
        let build = crate::pipeline::ledger::MetadataLedger::from_records(batch.records);
        assert_eq!(build.ledger.len(), 4);
        assert!(build.ledger.validate().is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_documents_are_excluded_not_fatal() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw");
        write_png(&raw.join("invoices/b.png"), &GrayImage::from_pixel(8, 8, Luma([90])));
        write_png(
            &raw.join("invoices/a.png"),
            &GrayImage::from_fn(8, 8, |x, _| Luma([(x * 30) as u8])),
        );
        fs::write(raw.join("invoices/broken.jpg"), b"not a jpeg").unwrap();
        fs::write(raw.join("notes.md"), b"ignored").unwrap();

        let data = DataConfig {
            raw_dir: raw.clone(),
            ..DataConfig::default()
        };
        let batch = assess_corpus(&data, Arc::new(LaplacianAssessor::new()), 2)
            .await
            .unwrap();

        let ids: Vec<_> = batch.records.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["invoices_a", "invoices_b"]);
        assert_eq!(batch.excluded.len(), 1);
        assert!(batch.excluded[0].source_path.ends_with("broken.jpg"));
        assert!(batch.records.iter().all(|r| r.doc_type == "invoices" && r.file_format == "png"));
    }

    #[test]
    fn test_missing_raw_dir_is_configuration_error() {
        let err = discover_documents(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
