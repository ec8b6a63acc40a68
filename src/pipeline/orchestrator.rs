use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::constants::{
    ALERT_LOG_FILE, BIAS_REPORT_FILE, DATA_CARD_FILE, FEATURES_FILE, FEATURE_SCHEMA_FILE,
    LABELS_FILE, LEDGER_FILE,
};
use crate::domain::ReceiptLabels;
use crate::error::{PipelineError, Result};
use crate::pipeline::aggregate::LedgerMetrics;
use crate::pipeline::alerts::{AlertEngine, AlertSink, JsonFileSink, TracingSink};
use crate::pipeline::assess::LaplacianAssessor;
use crate::pipeline::bias::{BiasDetector, BiasReport};
use crate::pipeline::context::{RunContext, Stage};
use crate::pipeline::data_card::{
    class_distribution, read_data_card, write_feature_csv, write_json, DataCard, FeatureSchema,
    SplitSummary,
};
use crate::pipeline::ingest::{assess_corpus, AssessmentBatch};
use crate::pipeline::labels::{read_labels_csv, write_labels_csv};
use crate::pipeline::ledger::{MetadataLedger, LedgerBuild};
use crate::pipeline::split::{split, Completeness, LabeledReceipts, RequiredMetadata, SplitAssignment};

/// Counts reported at the end of a run.
#[derive(Debug, Default, Serialize)]
pub struct PipelineResult {
    pub documents_assessed: usize,
    pub documents_excluded: usize,
    pub ledger_records: usize,
    pub duplicates_rejected: usize,
    pub split: Option<SplitSummary>,
    pub total_biases: usize,
    pub alerts: usize,
    pub output_files: Vec<String>,
}

/// Ledger state handed from the build stage to the downstream stages.
pub struct LedgerState {
    pub ledger: MetadataLedger,
    pub labels: Vec<ReceiptLabels>,
    pub duplicates_rejected: usize,
}

pub struct Pipeline;

impl Pipeline {
    /// Run every stage in order and flush the alert log, whether or not a
    /// stage failed.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn run(ctx: &mut RunContext) -> Result<PipelineResult> {
        info!("🚀 Starting governance pipeline (config: {})", ctx.config_source_label());
        let started = Instant::now();
        let outcome = Self::run_stages(ctx).await;
        info!("Pipeline finished in {:.2}s", started.elapsed().as_secs_f64());
        Self::finish(ctx, outcome)
    }

    async fn run_stages(ctx: &mut RunContext) -> Result<PipelineResult> {
        // Step 1: Assess raw documents
        let batch = Self::assess(ctx).await?;

        // Step 2: Build and persist the ledger
        let state = ctx.run_stage(Stage::BuildLedger, |ctx| Self::build_ledger(ctx, &batch))?;

        // Step 3: Validate before anything downstream sees the ledger
        ctx.run_stage(Stage::Validate, |_| state.ledger.validate())?;

        // Step 4: Split
        let assignment = ctx.run_stage(Stage::Split, |ctx| Self::split_ledger(ctx, &state))?;

        // Step 5: Bias analysis
        let report = ctx.run_stage(Stage::AnalyzeBias, |ctx| Self::analyze_bias(ctx, &state.ledger))?;

        // Step 6: Threshold alerts
        let metrics = LedgerMetrics::from_ledger(&state.ledger, state.duplicates_rejected);
        ctx.run_stage(Stage::Alert, |ctx| {
            Self::alert(ctx, &metrics, &report);
            Ok(())
        })?;

        let split_summary = summarize(&assignment);
        let card = Self::data_card(ctx, &batch, &state, &metrics, Some(split_summary.clone()), Some(&report));
        let card_path = ctx.run_stage(Stage::Persist, |ctx| Self::write_data_card(ctx, &card))?;
        let processed = &ctx.config.data.processed_dir;

        Ok(PipelineResult {
            documents_assessed: batch.records.len(),
            documents_excluded: batch.excluded.len(),
            ledger_records: state.ledger.len(),
            duplicates_rejected: state.duplicates_rejected,
            split: Some(split_summary),
            total_biases: report.total_biases,
            alerts: ctx.alerts.len(),
            output_files: vec![
                processed.join(LEDGER_FILE).display().to_string(),
                processed.join(FEATURES_FILE).display().to_string(),
                ctx.config.data.splits_dir.display().to_string(),
                ctx.config.data.reports_dir.join(BIAS_REPORT_FILE).display().to_string(),
                card_path.display().to_string(),
            ],
        })
    }

    /// Assess the raw corpus on blocking worker tasks.
    pub async fn assess(ctx: &mut RunContext) -> Result<AssessmentBatch> {
        info!("📥 Assessing documents in {}", ctx.config.data.raw_dir.display());
        let assessor = Arc::new(LaplacianAssessor::with_config(ctx.config.assessment.clone()));
        let outcome = assess_corpus(&ctx.config.data, assessor, ctx.config.assessment.workers).await;
        ctx.record_outcome(Stage::Assess, outcome)
    }

    /// Build the ledger from an assessment batch and persist the ledger,
    /// label table, feature table and feature schema.
    pub fn build_ledger(ctx: &RunContext, batch: &AssessmentBatch) -> Result<LedgerState> {
        let LedgerBuild {
            ledger,
            rejected_duplicates,
        } = MetadataLedger::from_records(batch.records.iter().cloned());

        let processed = &ctx.config.data.processed_dir;
        ledger.write_csv(&processed.join(LEDGER_FILE))?;
        write_labels_csv(&batch.labels, &processed.join(LABELS_FILE))?;
        let schema = FeatureSchema::for_records(ledger.records());
        write_feature_csv(ledger.records(), schema.quality_bins, &processed.join(FEATURES_FILE))?;
        write_json(&schema, &processed.join(FEATURE_SCHEMA_FILE))?;
        info!("💾 Ledger with {} records saved to {}", ledger.len(), processed.display());

        Ok(LedgerState {
            ledger,
            labels: batch.labels.clone(),
            duplicates_rejected: rejected_duplicates.len(),
        })
    }

    /// Reload a persisted ledger. Invariant violations in the file are fatal.
    pub fn load_ledger(ctx: &RunContext) -> Result<LedgerState> {
        let processed = &ctx.config.data.processed_dir;
        let ledger_path = processed.join(LEDGER_FILE);
        if !ledger_path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "Ledger not found at {}; run the assess stage first",
                ledger_path.display()
            )));
        }
        let (records, violations) = MetadataLedger::audit_csv(&ledger_path)?;
        if !violations.is_empty() {
            return Err(PipelineError::InvariantViolation(violations));
        }
        let labels_path = processed.join(LABELS_FILE);
        let labels = if labels_path.is_file() {
            read_labels_csv(&labels_path)?
        } else {
            warn!(path = %labels_path.display(), "No label table, continuing without labels");
            Vec::new()
        };
        // Duplicates were rejected before the ledger was persisted; the data
        // card from that run remembers how many.
        let card_path = processed.join(DATA_CARD_FILE);
        let duplicates_rejected = if card_path.is_file() {
            read_data_card(&card_path)?.duplicates_rejected
        } else {
            0
        };
        Ok(LedgerState {
            ledger: MetadataLedger::from_records(records).ledger,
            labels,
            duplicates_rejected,
        })
    }

    pub fn split_ledger(ctx: &RunContext, state: &LedgerState) -> Result<SplitAssignment> {
        let split_config = &ctx.config.split;
        let completeness: Box<dyn Completeness> = if split_config.require_labels {
            Box::new(LabeledReceipts::new(&state.labels))
        } else {
            Box::new(RequiredMetadata)
        };
        let assignment = split(&state.ledger, split_config, completeness.as_ref())?;
        assignment.write_tables(&ctx.config.data.splits_dir)?;
        info!(
            "✂️  Split {} records into {}/{}/{} (seed {})",
            assignment.total(),
            assignment.train.len(),
            assignment.validation.len(),
            assignment.test.len(),
            assignment.seed
        );
        Ok(assignment)
    }

    pub fn analyze_bias(ctx: &RunContext, ledger: &MetadataLedger) -> Result<BiasReport> {
        let report = BiasDetector::with_config(ctx.config.bias.clone()).analyze(ledger);
        let path = ctx.config.data.reports_dir.join(BIAS_REPORT_FILE);
        report.write_json(&path)?;
        info!("📊 Bias report ({} detected) saved to {}", report.total_biases, path.display());
        Ok(report)
    }

    /// Evaluate thresholds and append the resulting events to the run's log.
    pub fn alert(ctx: &mut RunContext, metrics: &LedgerMetrics, report: &BiasReport) {
        let events = AlertEngine::with_thresholds(ctx.config.thresholds.clone())
            .evaluate(metrics, &report.biases);
        if !events.is_empty() {
            warn!("⚠️  {} data quality alerts raised", events.len());
        }
        ctx.alerts.extend(events);
    }

    pub fn data_card(
        ctx: &RunContext,
        batch: &AssessmentBatch,
        state: &LedgerState,
        metrics: &LedgerMetrics,
        split: Option<SplitSummary>,
        report: Option<&BiasReport>,
    ) -> DataCard {
        DataCard {
            run_id: ctx.run_id,
            generated_at: chrono::Utc::now(),
            config_source: ctx.config_source_label(),
            documents_assessed: batch.records.len(),
            documents_excluded: batch.excluded.len(),
            duplicates_rejected: state.duplicates_rejected,
            labeled_documents: state.labels.len(),
            complete_labels: state.labels.iter().filter(|l| l.has_all).count(),
            metrics: metrics.clone(),
            quality_classes: class_distribution(state.ledger.records()),
            split,
            total_biases: report.map_or(0, |r| r.total_biases),
            alerts: ctx.alerts.len(),
        }
    }

    pub fn write_data_card(ctx: &RunContext, card: &DataCard) -> Result<PathBuf> {
        let path = ctx.config.data.processed_dir.join(DATA_CARD_FILE);
        write_json(card, &path)?;
        info!("🗂️  Data card saved to {}", path.display());
        Ok(path)
    }

    /// Write the alert log and echo every event to the log stream.
    pub fn flush_alerts(ctx: &RunContext) -> Result<PathBuf> {
        let path = ctx.config.data.reports_dir.join(ALERT_LOG_FILE);
        let file_sink = JsonFileSink::new(path.clone());
        let sinks: [&dyn AlertSink; 2] = [&file_sink, &TracingSink];
        for sink in sinks {
            ctx.alerts.flush(sink)?;
        }
        Ok(path)
    }

    /// Assess, build, and validate only. Used by the `assess` subcommand.
    pub async fn run_assess(ctx: &mut RunContext) -> Result<PipelineResult> {
        let outcome = Self::assess_stages(ctx).await;
        Self::finish(ctx, outcome)
    }

    async fn assess_stages(ctx: &mut RunContext) -> Result<PipelineResult> {
        let batch = Self::assess(ctx).await?;
        let state = ctx.run_stage(Stage::BuildLedger, |ctx| Self::build_ledger(ctx, &batch))?;
        ctx.run_stage(Stage::Validate, |_| state.ledger.validate())?;

        let metrics = LedgerMetrics::from_ledger(&state.ledger, state.duplicates_rejected);
        let card = Self::data_card(ctx, &batch, &state, &metrics, None, None);
        let card_path = ctx.run_stage(Stage::Persist, |ctx| Self::write_data_card(ctx, &card))?;

        Ok(PipelineResult {
            documents_assessed: batch.records.len(),
            documents_excluded: batch.excluded.len(),
            ledger_records: state.ledger.len(),
            duplicates_rejected: state.duplicates_rejected,
            output_files: vec![
                ctx.config.data.processed_dir.join(LEDGER_FILE).display().to_string(),
                card_path.display().to_string(),
            ],
            ..PipelineResult::default()
        })
    }

    /// Split a persisted ledger. Used by the `split` subcommand.
    pub fn run_split(ctx: &mut RunContext) -> Result<PipelineResult> {
        let outcome = ctx
            .run_stage(Stage::Validate, |ctx| Self::load_ledger(ctx))
            .and_then(|state| {
                let assignment = ctx.run_stage(Stage::Split, |ctx| Self::split_ledger(ctx, &state))?;
                Ok(PipelineResult {
                    ledger_records: state.ledger.len(),
                    split: Some(summarize(&assignment)),
                    output_files: vec![ctx.config.data.splits_dir.display().to_string()],
                    ..PipelineResult::default()
                })
            });
        Self::finish(ctx, outcome)
    }

    /// Bias analysis and alerting over a persisted ledger. Used by the
    /// `analyze` subcommand.
    pub fn run_analyze(ctx: &mut RunContext) -> Result<PipelineResult> {
        let outcome = ctx
            .run_stage(Stage::Validate, |ctx| Self::load_ledger(ctx))
            .and_then(|state| {
                let report = ctx.run_stage(Stage::AnalyzeBias, |ctx| Self::analyze_bias(ctx, &state.ledger))?;
                let metrics = LedgerMetrics::from_ledger(&state.ledger, state.duplicates_rejected);
                Self::alert(ctx, &metrics, &report);
                Ok(PipelineResult {
                    ledger_records: state.ledger.len(),
                    duplicates_rejected: state.duplicates_rejected,
                    total_biases: report.total_biases,
                    output_files: vec![ctx
                        .config
                        .data
                        .reports_dir
                        .join(BIAS_REPORT_FILE)
                        .display()
                        .to_string()],
                    ..PipelineResult::default()
                })
            });
        Self::finish(ctx, outcome)
    }

    fn finish(ctx: &mut RunContext, outcome: Result<PipelineResult>) -> Result<PipelineResult> {
        let flushed = Self::flush_alerts(ctx);
        let mut result = outcome?;
        result.output_files.push(flushed?.display().to_string());
        result.alerts = ctx.alerts.len();
        Ok(result)
    }
}

fn summarize(assignment: &SplitAssignment) -> SplitSummary {
    SplitSummary {
        seed: assignment.seed,
        train: assignment.train.len(),
        validation: assignment.validation.len(),
        test: assignment.test.len(),
        excluded: assignment.excluded.len(),
    }
}
