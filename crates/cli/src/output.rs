//! Plain-text renderings of runs, signals and merges for the terminal.

use std::fmt::Write;
use std::path::Path;
use storage::models::{Document, Failure, Run};
use triage_core::archive::MergeReport;
use triage_core::models::DocumentStatus;
use triage_core::pipeline::{ExtractedSignal, RunReport};

pub fn run_summary(run_id: Option<i64>, report: &RunReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let run = run_id.map_or_else(|| "unrecorded run".to_string(), |id| format!("run {id}"));
    let _ = writeln!(
        out,
        "{run}{mode}: {} documents, {} archived, {} planned, {} failed",
        report.documents.len(),
        report.count(DocumentStatus::Archived),
        report.count(DocumentStatus::Planned),
        report.count(DocumentStatus::Failed),
    );
    for doc in &report.documents {
        let selection = doc.selection.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "  [{}] {} -> {} ({selection}{})",
            doc.status.as_str(),
            display_name(&doc.path),
            if doc.labels.is_empty() {
                "-".to_string()
            } else {
                doc.labels.join(", ")
            },
            if doc.ocr_used { ", ocr" } else { "" },
        );
        if let Some(reason) = &doc.reason {
            let _ = writeln!(out, "      {reason}");
        }
    }
    if !report.failures.is_empty() {
        let _ = writeln!(out, "{} stage failures logged", report.failures.len());
    }
    out
}

/// The full report as JSON, with `run_id` null when the run log refused it.
pub fn report_json(run_id: Option<i64>, report: &RunReport) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(report)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("run_id".into(), run_id.into());
    }
    serde_json::to_string_pretty(&value)
}

pub fn signal_summary(signal: &ExtractedSignal) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "file:   {}", signal.path.display());
    let _ = writeln!(out, "kind:   {}", signal.kind);
    let _ = writeln!(out, "ocr:    {}", if signal.ocr_used { "yes" } else { "no" });
    let _ = writeln!(out, "signal: {}", signal.signal);
    for f in &signal.failures {
        let _ = writeln!(out, "failed: {}: {}", f.stage, f.reason);
    }
    if !signal.text.is_empty() {
        let _ = writeln!(out, "---");
        let _ = writeln!(out, "{}", signal.text.trim_end());
    }
    out
}

pub fn merge_summary(report: &MergeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "merged {} entries ({} renamed), {} failed",
        report.placed.len(),
        report.renamed,
        report.failures.len()
    );
    for (path, reason) in &report.failures {
        let _ = writeln!(out, "  {}: {reason}", path.display());
    }
    out
}

/// A run read back from the run log.
pub fn stored_run(run: &Run, documents: &[Document], failures: &[Failure]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "run {} {} -> {}{}",
        run.id,
        run.source,
        run.archive_root,
        if run.dry_run { " (dry run)" } else { "" }
    );
    let _ = writeln!(
        out,
        "started {}, finished {}, threshold {:.2}",
        run.started_at, run.finished_at, run.threshold
    );
    for doc in documents {
        let labels: Vec<String> = serde_json::from_str(&doc.labels_json).unwrap_or_default();
        let _ = writeln!(
            out,
            "  [{}] {} -> {}",
            doc.status,
            display_name(Path::new(&doc.path)),
            if labels.is_empty() { "-".to_string() } else { labels.join(", ") }
        );
    }
    if !failures.is_empty() {
        let _ = writeln!(out, "failures:");
        for f in failures {
            let _ = writeln!(out, "  {} [{}] {}", f.path, f.stage, f.reason);
        }
    }
    out
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
