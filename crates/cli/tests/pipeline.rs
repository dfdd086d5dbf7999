use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use triage_core::archive::ArchiveManager;
use triage_core::config;
use triage_core::models::DocumentStatus;
use triage_core::pipeline::Pipeline;
use triage_cli::run::run_triage;
use triage_core::runlog;

const LABELS: [&str; 3] = ["财务_经费提醒", "外界公司", "学生管理"];

struct Workspace {
    _tmp: TempDir,
    source: PathBuf,
    archive: PathBuf,
    config: String,
    db: PathBuf,
}

fn slash(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

/// Intake folder, archive root, fitted model artifacts and a config file
/// tying them together.
fn workspace(dry_run: bool) -> Workspace {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    let source = root.join("inbox");
    let archive = root.join("archive");
    let models = root.join("models");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&models).unwrap();

    fs::write(
        models.join("tfidf.json"),
        r#"{
            "vocabulary": {"finance": 0, "budget": 1, "company": 2, "contract": 3, "student": 4, "enrollment": 5},
            "idf": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        }"#,
    )
    .unwrap();
    fs::write(
        models.join("classifier.json"),
        r#"{
            "labels": ["学生管理", "财务_经费提醒", "外界公司"],
            "weights": [
                [0, 0, 0, 0, 6, 6],
                [6, 6, 0, 0, 0, 0],
                [0, 0, 6, 6, 0, 0]
            ],
            "bias": [-2, -2, -2]
        }"#,
    )
    .unwrap();

    let db = root.join("state/triage.db");
    let body = format!(
        r#"
[scan]
source = "{source}"

[archive]
root = "{archive}"
dry_run = {dry_run}

[taxonomy]
labels = ["{l0}", "{l1}", "{l2}"]

[encoder]
kind = "tfidf"
artifact = "{models}/tfidf.json"

[classifier]
artifact = "{models}/classifier.json"

[classification.thresholds]
accept = 0.5

[ocr]
enabled = false

[pipeline]
workers = 2

[database]
path = "{db}"
"#,
        source = slash(&source),
        archive = slash(&archive),
        models = slash(&models),
        db = slash(&db),
        l0 = LABELS[0],
        l1 = LABELS[1],
        l2 = LABELS[2],
    );
    let config_path = root.join("triage.toml");
    fs::write(&config_path, body).unwrap();

    Workspace {
        config: config_path.to_string_lossy().into_owned(),
        _tmp: tmp,
        source,
        archive,
        db,
    }
}

#[tokio::test]
async fn confident_documents_land_in_their_label_folders() {
    let ws = workspace(false);
    fs::write(
        ws.source.join("2024_finance.txt"),
        "Annual Report 2024 Finance Budget",
    )
    .unwrap();
    fs::write(ws.source.join("contract.txt"), "company contract renewal").unwrap();
    // An earlier run already filed a document with the same name.
    fs::create_dir_all(ws.archive.join(LABELS[0])).unwrap();
    fs::write(ws.archive.join(LABELS[0]).join("2024_finance.txt"), "old").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let report = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();
    assert_eq!(report.documents.len(), 2);
    assert_eq!(report.count(DocumentStatus::Archived), 2);

    let finance = report.document(&ws.source.join("2024_finance.txt")).unwrap();
    assert_eq!(finance.labels, vec![LABELS[0].to_string()]);
    assert_eq!(finance.selection.as_deref(), Some("threshold_match"));
    // Probabilities follow the taxonomy order, not the artifact's.
    assert!(finance.probabilities[0] > 0.9);
    assert!(finance.probabilities[1] < 0.5 && finance.probabilities[2] < 0.5);
    assert_eq!(
        finance.destinations,
        vec![ws.archive.join(LABELS[0]).join("2024_finance_1.txt")]
    );
    assert_eq!(
        fs::read_to_string(ws.archive.join(LABELS[0]).join("2024_finance.txt")).unwrap(),
        "old"
    );

    let contract = report.document(&ws.source.join("contract.txt")).unwrap();
    assert_eq!(contract.labels, vec![LABELS[1].to_string()]);
    assert!(ws.archive.join(LABELS[1]).join("contract.txt").is_file());

    assert!(!ws.source.join("2024_finance.txt").exists());
    assert!(!ws.source.join("contract.txt").exists());
    for label in LABELS {
        assert!(ws.archive.join(label).is_dir(), "missing folder for {label}");
    }
}

#[tokio::test]
async fn unsure_documents_still_get_a_best_guess() {
    let ws = workspace(false);
    fs::write(ws.source.join("notes.txt"), "lunch menu for friday").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let report = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();
    let doc = &report.documents[0];
    assert_eq!(doc.status, DocumentStatus::Archived);
    assert_eq!(doc.selection.as_deref(), Some("best_guess"));
    assert_eq!(doc.labels.len(), 1);
    assert!(doc.probabilities.iter().all(|p| *p < 0.5));
    assert!(ws.archive.join(&doc.labels[0]).join("notes.txt").is_file());
}

#[tokio::test]
async fn dry_run_plans_without_moving() {
    let ws = workspace(true);
    fs::write(ws.source.join("enrollment.txt"), "student enrollment list").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let report = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();
    let doc = &report.documents[0];
    assert_eq!(doc.status, DocumentStatus::Planned);
    assert_eq!(doc.labels, vec![LABELS[2].to_string()]);
    assert_eq!(
        doc.destinations,
        vec![ws.archive.join(LABELS[2]).join("enrollment.txt")]
    );
    assert!(ws.source.join("enrollment.txt").is_file());
    assert!(!ws.archive.exists());
}

#[tokio::test]
async fn runs_are_persisted_to_the_run_log() {
    let ws = workspace(false);
    fs::write(ws.source.join("budget.txt"), "finance budget").unwrap();
    fs::write(ws.source.join("scan.pdf"), b"not really a pdf").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let report = Pipeline::from_config(&cfg).unwrap().run().await.unwrap();

    let pool = storage::connect(&cfg.database.path).await.unwrap();
    storage::migrate(&pool).await.unwrap();
    let id = runlog::record_run(&pool, &report).await.unwrap();
    assert!(ws.db.is_file());
    assert_eq!(runlog::latest_run_id(&pool).await.unwrap(), Some(id));

    let docs = runlog::load_documents(&pool, id).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.status == "archived"));

    // The broken pdf is still filed by name, with its extraction failure logged.
    let failures = runlog::load_failures(&pool, id).await.unwrap();
    assert!(failures
        .iter()
        .any(|f| f.path.ends_with("scan.pdf") && f.stage == "extraction"));
}

#[tokio::test]
async fn unusable_run_log_stops_before_any_file_moves() {
    let ws = workspace(false);
    let doc = ws.source.join("budget.txt");
    fs::write(&doc, "finance budget").unwrap();
    // The database's parent folder is a plain file, so the log cannot open.
    fs::write(ws.db.parent().unwrap(), "not a folder").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let err = run_triage(&cfg).await.err().unwrap();
    assert!(format!("{err:#}").contains("opening run log"));
    assert!(doc.exists());
    assert!(!ws.archive.join(LABELS[0]).join("budget.txt").exists());
}

#[tokio::test]
async fn recorded_run_carries_its_id() {
    let ws = workspace(false);
    fs::write(ws.source.join("budget.txt"), "finance budget").unwrap();

    let cfg = config::load(Some(&ws.config)).unwrap();
    let recorded = run_triage(&cfg).await.unwrap();
    let pool = storage::connect(&cfg.database.path).await.unwrap();
    assert_eq!(runlog::latest_run_id(&pool).await.unwrap(), recorded.run_id);
    assert_eq!(recorded.report.count(DocumentStatus::Archived), 1);
}

#[test]
fn merging_archive_folders_keeps_both_copies() {
    let tmp = tempdir().unwrap();
    let old = tmp.path().join("old/外界公司");
    let new = tmp.path().join("archive/外界公司");
    fs::create_dir_all(&old).unwrap();
    fs::create_dir_all(&new).unwrap();
    fs::write(old.join("a.txt"), "old a").unwrap();
    fs::write(old.join("b.txt"), "old b").unwrap();
    fs::write(new.join("a.txt"), "new a").unwrap();

    let report = ArchiveManager::new(false).merge_into(&old, &new).unwrap();
    assert_eq!(report.placed.len(), 2);
    assert_eq!(report.renamed, 1);
    assert!(report.failures.is_empty());
    assert_eq!(fs::read_to_string(new.join("a.txt")).unwrap(), "new a");
    assert_eq!(fs::read_to_string(new.join("a_1.txt")).unwrap(), "old a");
    assert_eq!(fs::read_to_string(new.join("b.txt")).unwrap(), "old b");
    assert!(!old.exists());
}
