//! The `run` command.

use anyhow::{Context, Result};
use tracing::warn;
use triage_core::config::AppConfig;
use triage_core::pipeline::{Pipeline, RunReport};
use triage_core::runlog;

pub struct RecordedRun {
    /// `None` when the run log refused the run.
    pub run_id: Option<i64>,
    pub report: RunReport,
}

/// Loads the models and opens the run log before any document is touched,
/// so a broken database stops the run while the intake folder is intact.
pub async fn run_triage(cfg: &AppConfig) -> Result<RecordedRun> {
    let pipeline = Pipeline::from_config(cfg)?;
    let pool = storage::connect(&cfg.database.path)
        .await
        .with_context(|| format!("opening run log {}", cfg.database.path))?;
    storage::migrate(&pool).await.context("migrating run log")?;

    let report = pipeline.run().await?;
    let run_id = match runlog::record_run(&pool, &report).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("could not record the run: {e:#}");
            None
        }
    };
    Ok(RecordedRun { run_id, report })
}
