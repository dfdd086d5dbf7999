use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Run {
    pub id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub source: String,
    pub archive_root: String,
    pub dry_run: bool,
    pub threshold: f64,
    pub documents: i64,
    pub failures: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Document {
    pub id: i64,
    pub run_id: i64,
    pub path: String,
    pub kind: String,
    pub content_hash: Option<String>,
    pub status: String,
    pub selection: Option<String>,
    pub labels_json: String,
    pub destinations_json: String,
    pub ocr_used: bool,
    pub preview: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Failure {
    pub id: i64,
    pub run_id: i64,
    pub path: String,
    pub stage: String,
    pub reason: String,
}
