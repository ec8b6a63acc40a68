use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use ledgerx_pipeline::schema::{ReportKind, ReportValidator};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Bias,
    Alerts,
}

impl From<KindArg> for ReportKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Bias => ReportKind::BiasReport,
            KindArg::Alerts => ReportKind::AlertLog,
        }
    }
}

/// Check bias reports and alert logs against the bundled v1 schemas.
#[derive(Parser, Debug)]
#[command(name = "validate-report", version, about = "Validate pipeline report JSON against schema")]
struct Cli {
    /// Report files; the kind is taken from the file name unless --kind is set
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Schema file to use instead of the bundled one
    #[arg(long)]
    schema: Option<PathBuf>,
}

fn validator_for(cli: &Cli, path: &PathBuf) -> Result<ReportValidator> {
    if let Some(schema) = &cli.schema {
        return ReportValidator::from_schema_file(schema)
            .with_context(|| format!("Failed to load schema {}", schema.display()));
    }
    let kind = cli
        .kind
        .map(ReportKind::from)
        .or_else(|| ReportKind::from_file_name(path))
        .ok_or_else(|| anyhow!("Cannot tell the report kind of {}; pass --kind", path.display()))?;
    Ok(ReportValidator::bundled(kind)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut invalid = 0usize;

    for path in &cli.paths {
        let validator = validator_for(&cli, path)?;
        let errors = validator
            .errors_in_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if errors.is_empty() {
            println!("✅ {}: valid", path.display());
        } else {
            invalid += 1;
            eprintln!("❌ {}: invalid", path.display());
            for error in errors {
                eprintln!("   - {}", error);
            }
        }
    }

    if invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}
