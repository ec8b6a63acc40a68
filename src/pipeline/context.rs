use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::config::{ConfigSource, PipelineConfig, ResolvedConfig};
use crate::error::Result;
use crate::pipeline::alerts::AlertLog;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Assess,
    BuildLedger,
    Validate,
    Split,
    AnalyzeBias,
    Alert,
    Persist,
    Verify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Assess => "assess",
            Stage::BuildLedger => "build_ledger",
            Stage::Validate => "validate",
            Stage::Split => "split",
            Stage::AnalyzeBias => "analyze_bias",
            Stage::Alert => "alert",
            Stage::Persist => "persist",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by one pipeline run and passed explicitly to every stage.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub config_source: ConfigSource,
    pub alerts: AlertLog,
}

impl RunContext {
    pub fn new(resolved: ResolvedConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            config: resolved.config,
            config_source: resolved.source,
            alerts: AlertLog::new(),
        }
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::new(ResolvedConfig {
            config,
            source: ConfigSource::Defaults,
        })
    }

    pub fn config_source_label(&self) -> String {
        match &self.config_source {
            ConfigSource::File(path) => path.display().to_string(),
            ConfigSource::Defaults => "defaults".to_string(),
        }
    }

    /// Run `body` as `stage`. A failure is recorded as a `pipeline_failure`
    /// alert before it is returned.
    pub fn run_stage<T>(
        &mut self,
        stage: Stage,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let span = info_span!("stage", run_id = %self.run_id, stage = stage.as_str());
        let _enter = span.enter();
        info!("Stage started");
        let outcome = body(self);
        if outcome.is_ok() {
            info!("Stage finished");
        }
        self.record_outcome(stage, outcome)
    }

    /// Record a `pipeline_failure` alert if `outcome` is an error. Used for
    /// stages that run outside `run_stage`, such as async assessment.
    pub fn record_outcome<T>(&mut self, stage: Stage, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            self.alerts.record_failure(stage.as_str(), &e.to_string());
        }
        outcome
    }
}
