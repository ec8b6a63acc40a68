//! JSON Schema checks for the persisted bias report and alert log.
//!
//! The v1 schemas under `schemas/` are compiled into the crate so that
//! validation does not depend on the working directory.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::constants::{ALERT_LOG_FILE, BIAS_REPORT_FILE};
use crate::error::{PipelineError, Result};

const BIAS_REPORT_SCHEMA: &str = include_str!("../schemas/bias_report.v1.json");
const ALERT_LOG_SCHEMA: &str = include_str!("../schemas/alert_log.v1.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    BiasReport,
    AlertLog,
}

impl ReportKind {
    /// Kind implied by one of the pipeline's artifact file names.
    pub fn from_file_name(path: &Path) -> Option<Self> {
        match path.file_name()?.to_str()? {
            BIAS_REPORT_FILE => Some(ReportKind::BiasReport),
            ALERT_LOG_FILE => Some(ReportKind::AlertLog),
            _ => None,
        }
    }

    fn bundled_schema(self) -> &'static str {
        match self {
            ReportKind::BiasReport => BIAS_REPORT_SCHEMA,
            ReportKind::AlertLog => ALERT_LOG_SCHEMA,
        }
    }
}

pub struct ReportValidator {
    schema: JSONSchema,
}

impl ReportValidator {
    /// Validator for the schema shipped with this crate.
    pub fn bundled(kind: ReportKind) -> Result<Self> {
        Self::from_schema(serde_json::from_str(kind.bundled_schema())?)
    }

    pub fn from_schema_file(path: &Path) -> Result<Self> {
        Self::from_schema(read_json_value(path)?)
    }

    pub fn from_schema(schema: Value) -> Result<Self> {
        // jsonschema 0.17 borrows the schema for 'static
        let schema: &'static Value = Box::leak(Box::new(schema));
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| PipelineError::Configuration(format!("Invalid JSON Schema: {}", e)))?;
        Ok(Self { schema: compiled })
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.schema.is_valid(instance)
    }

    /// Every schema error as `<message> at <instance path>`; empty when valid.
    pub fn errors(&self, instance: &Value) -> Vec<String> {
        match self.schema.validate(instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect(),
        }
    }

    pub fn errors_in_file(&self, path: &Path) -> Result<Vec<String>> {
        Ok(self.errors(&read_json_value(path)?))
    }
}

fn read_json_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
