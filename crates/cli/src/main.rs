use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use triage_cli::output;
use triage_cli::run::run_triage;
use triage_core::archive::ArchiveManager;
use triage_core::config::{self, AppConfig};
use triage_core::pipeline::SignalExtractor;
use triage_core::runlog;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            source,
            archive_root,
            threshold,
            dry_run,
            json,
        } => {
            if let Some(s) = source {
                cfg.scan.source = s.to_string_lossy().into_owned();
            }
            if let Some(r) = archive_root {
                cfg.archive.root = r.to_string_lossy().into_owned();
            }
            if let Some(t) = threshold {
                cfg.classification.thresholds.accept = t;
            }
            cfg.archive.dry_run |= dry_run;
            let recorded = run_triage(&cfg).await?;
            if json {
                println!("{}", output::report_json(recorded.run_id, &recorded.report)?);
            } else {
                print!("{}", output::run_summary(recorded.run_id, &recorded.report));
            }
            if recorded.run_id.is_none() {
                if !json {
                    eprintln!("{}", output::report_json(None, &recorded.report)?);
                }
                anyhow::bail!("the run finished but was not recorded in {}", cfg.database.path);
            }
        }
        Commands::Extract { file, json } => {
            let extractor =
                SignalExtractor::from_config(&cfg.extraction, &cfg.ocr, &cfg.normalizer);
            let signal = tokio::task::spawn_blocking(move || extractor.extract(&file))
                .await
                .context("extraction task failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&signal)?);
            } else {
                print!("{}", output::signal_summary(&signal));
            }
        }
        Commands::Merge { src, dest } => {
            let manager = ArchiveManager::new(cfg.archive.copy_then_delete);
            let report = manager.merge_into(&src, &dest)?;
            print!("{}", output::merge_summary(&report));
            if !report.failures.is_empty() {
                anyhow::bail!("{} entries could not be merged", report.failures.len());
            }
        }
        Commands::Report {
            run_id,
            failures,
            json,
        } => {
            show_report(&cfg, run_id, failures, json).await?;
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "doc-triage", about = "Sort an intake folder into a labelled archive")]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every document under the source folder and file it
    Run {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        archive_root: Option<PathBuf>,
        /// Overrides classification.thresholds.accept
        #[arg(long)]
        threshold: Option<f32>,
        /// Plan destinations without touching any file
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the text and normalized signal of a single file
    Extract {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Merge one archive folder into another, suffixing name collisions
    Merge { src: PathBuf, dest: PathBuf },
    /// Print a recorded run from the run log
    Report {
        /// Defaults to the latest run
        #[arg(long)]
        run_id: Option<i64>,
        /// Only list failures
        #[arg(long, default_value_t = false)]
        failures: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

async fn show_report(cfg: &AppConfig, run_id: Option<i64>, failures_only: bool, json: bool) -> Result<()> {
    let pool = storage::connect(&cfg.database.path).await?;
    storage::migrate(&pool).await?;
    let run_id = match run_id {
        Some(id) => id,
        None => runlog::latest_run_id(&pool)
            .await?
            .context("the run log is empty")?,
    };
    let run = runlog::load_run(&pool, run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    let failures = runlog::load_failures(&pool, run_id).await?;
    let documents = if failures_only {
        Vec::new()
    } else {
        runlog::load_documents(&pool, run_id).await?
    };

    if json {
        let value = serde_json::json!({
            "run": run,
            "documents": documents,
            "failures": failures,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", output::stored_run(&run, &documents, &failures));
    }
    Ok(())
}
