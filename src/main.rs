use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use ledgerx_pipeline::config::PipelineConfig;
use ledgerx_pipeline::constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use ledgerx_pipeline::logging;
use ledgerx_pipeline::metrics;
use ledgerx_pipeline::pipeline::{verify_outputs, Pipeline, PipelineResult, RunContext};

#[derive(Parser)]
#[command(name = "ledgerx_pipeline")]
#[command(about = "Data quality and governance pipeline for scanned receipts and invoices")]
#[command(version = "0.1.0")]
struct Cli {
    /// Pipeline config file (falls back to $LEDGERX_CONFIG, then config/pipeline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess raw documents and write the metadata ledger
    Assess,
    /// Split the persisted ledger into train/validation/test tables
    Split {
        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run bias analysis and threshold alerts over the persisted ledger
    Analyze,
    /// Run every stage in order: assess, ledger, validate, split, bias, alerts
    Run,
    /// Re-read persisted artifacts and check their invariants
    Verify,
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn print_result(result: &PipelineResult) {
    println!("\n📊 Pipeline Results:");
    if result.documents_assessed > 0 || result.documents_excluded > 0 {
        println!("   Assessed: {}", result.documents_assessed);
        println!("   Excluded: {}", result.documents_excluded);
    }
    println!("   Ledger records: {}", result.ledger_records);
    println!("   Duplicates rejected: {}", result.duplicates_rejected);
    if let Some(split) = &result.split {
        println!(
            "   Split (seed {}): train {} / val {} / test {} ({} excluded)",
            split.seed, split.train, split.validation, split.test, split.excluded
        );
    }
    println!("   Biases detected: {}", result.total_biases);
    println!("   Alerts: {}", result.alerts);
    for file in &result.output_files {
        println!("   Output: {}", file);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);
    metrics::init_metrics();

    let path = config_path(cli.config);
    let resolved = PipelineConfig::resolve(&path)
        .with_context(|| format!("Failed to resolve config {}", path.display()))?;
    let mut ctx = RunContext::new(resolved);
    info!(run_id = %ctx.run_id, config = %ctx.config_source_label(), "Run started");

    let outcome = match cli.command {
        Commands::Assess => {
            println!("📥 Assessing raw documents...");
            Pipeline::run_assess(&mut ctx).await
        }
        Commands::Split { seed } => {
            println!("✂️  Splitting ledger...");
            if let Some(seed) = seed {
                ctx.config.split.seed = seed;
            }
            Pipeline::run_split(&mut ctx)
        }
        Commands::Analyze => {
            println!("🔎 Analyzing bias and thresholds...");
            Pipeline::run_analyze(&mut ctx)
        }
        Commands::Run => {
            println!("🚀 Running full pipeline...");
            Pipeline::run(&mut ctx).await
        }
        Commands::Verify => {
            println!("🔍 Verifying outputs...");
            let report = verify_outputs(&ctx.config.data);
            for check in &report.checks {
                let mark = if check.passed { "✅" } else { "❌" };
                println!("   {} {}: {}", mark, check.name, check.detail);
            }
            if !report.passed() {
                bail!("{} verification checks failed", report.failures().count());
            }
            println!("✅ All outputs verified");
            return Ok(());
        }
    };

    match outcome {
        Ok(result) => {
            print_result(&result);
            println!("✅ Completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(run_id = %ctx.run_id, "Run failed: {}", e);
            println!("❌ Run failed: {}", e);
            Err(e.into())
        }
    }
}
