//! Persists run reports into the SQLite run log.

use crate::pipeline::RunReport;
use sqlx::SqlitePool;
use storage::models::{Document, Failure, Run};

/// Writes the run, its documents and its failures in one transaction.
pub async fn record_run(pool: &SqlitePool, report: &RunReport) -> anyhow::Result<i64> {
    let mut tx = pool.begin().await?;
    let run_id = sqlx::query(
        "INSERT INTO runs (started_at, finished_at, source, archive_root, dry_run, threshold, documents, failures)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(report.started_at.to_rfc3339())
    .bind(report.finished_at.to_rfc3339())
    .bind(report.source.to_string_lossy().into_owned())
    .bind(report.archive_root.to_string_lossy().into_owned())
    .bind(report.dry_run)
    .bind(f64::from(report.threshold))
    .bind(report.documents.len() as i64)
    .bind(report.failures.len() as i64)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for doc in &report.documents {
        let destinations: Vec<String> = doc
            .destinations
            .iter()
            .map(|d| d.to_string_lossy().into_owned())
            .collect();
        sqlx::query(
            "INSERT INTO documents (run_id, path, kind, content_hash, status, selection, labels_json, destinations_json, ocr_used, preview, reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(doc.path.to_string_lossy().into_owned())
        .bind(doc.kind.as_str())
        .bind(doc.hash.as_deref())
        .bind(doc.status.as_str())
        .bind(doc.selection.as_deref())
        .bind(serde_json::to_string(&doc.labels)?)
        .bind(serde_json::to_string(&destinations)?)
        .bind(doc.ocr_used)
        .bind(&doc.preview)
        .bind(doc.reason.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    for failure in &report.failures {
        sqlx::query("INSERT INTO failures (run_id, path, stage, reason) VALUES (?, ?, ?, ?)")
            .bind(run_id)
            .bind(failure.path.to_string_lossy().into_owned())
            .bind(failure.stage.as_str())
            .bind(&failure.reason)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::debug!(run_id, "run log written");
    Ok(run_id)
}

pub async fn latest_run_id(pool: &SqlitePool) -> anyhow::Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM runs")
        .fetch_one(pool)
        .await?;
    Ok(id)
}

pub async fn load_run(pool: &SqlitePool, run_id: i64) -> anyhow::Result<Option<Run>> {
    Ok(sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn load_documents(pool: &SqlitePool, run_id: i64) -> anyhow::Result<Vec<Document>> {
    Ok(
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE run_id = ? ORDER BY id")
            .bind(run_id)
            .fetch_all(pool)
            .await?,
    )
}

pub async fn load_failures(pool: &SqlitePool, run_id: i64) -> anyhow::Result<Vec<Failure>> {
    Ok(
        sqlx::query_as::<_, Failure>("SELECT * FROM failures WHERE run_id = ? ORDER BY id")
            .bind(run_id)
            .fetch_all(pool)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentKind, DocumentStatus, FailureRecord, Stage};
    use crate::pipeline::DocumentReport;
    use crate::selector::SelectionPolicy;
    use std::path::PathBuf;

    fn report() -> RunReport {
        let now = chrono::Utc::now();
        RunReport {
            started_at: now,
            finished_at: now,
            source: PathBuf::from("/in"),
            archive_root: PathBuf::from("/out"),
            dry_run: false,
            threshold: 0.5,
            policy: SelectionPolicy::Threshold,
            documents: vec![
                DocumentReport {
                    path: PathBuf::from("/in/budget.txt"),
                    kind: DocumentKind::Text,
                    hash: Some("abc".into()),
                    status: DocumentStatus::Archived,
                    labels: vec!["财务_经费提醒".into()],
                    selection: Some("threshold_match".into()),
                    probabilities: vec![0.9, 0.1],
                    destinations: vec![PathBuf::from("/out/财务_经费提醒/budget.txt")],
                    ocr_used: false,
                    preview: "annual budget".into(),
                    reason: None,
                },
                DocumentReport {
                    path: PathBuf::from("/in/locked.pdf"),
                    kind: DocumentKind::Pdf,
                    hash: None,
                    status: DocumentStatus::Failed,
                    labels: vec!["外界公司".into()],
                    selection: Some("best_guess".into()),
                    probabilities: vec![0.2, 0.3],
                    destinations: vec![],
                    ocr_used: true,
                    preview: String::new(),
                    reason: Some("move: permission denied".into()),
                },
            ],
            failures: vec![FailureRecord {
                path: PathBuf::from("/in/locked.pdf"),
                stage: Stage::Move,
                reason: "permission denied".into(),
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_through_sqlite() {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        storage::migrate(&pool).await.unwrap();
        assert_eq!(latest_run_id(&pool).await.unwrap(), None);

        let id = record_run(&pool, &report()).await.unwrap();
        assert_eq!(latest_run_id(&pool).await.unwrap(), Some(id));

        let run = load_run(&pool, id).await.unwrap().unwrap();
        assert_eq!(run.documents, 2);
        assert_eq!(run.failures, 1);

        let docs = load_documents(&pool, id).await.unwrap();
        assert_eq!(docs[0].status, "archived");
        assert_eq!(docs[0].labels_json, r#"["财务_经费提醒"]"#);
        assert_eq!(docs[1].selection.as_deref(), Some("best_guess"));
        assert!(docs[1].ocr_used);

        let failures = load_failures(&pool, id).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "move");
    }
}
