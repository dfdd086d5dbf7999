use crate::archive::ArchiveManager;
use crate::config::{AppConfig, ExtractionConfig, NormalizerConfig, OcrConfig};
use crate::extractor::{ExtractionDispatcher, ExtractorRegistry};
use crate::features::{self, Scorer};
use crate::models::{Document, DocumentKind, DocumentStatus, FailureRecord, Stage};
use crate::normalizer::Normalizer;
use crate::ocr::OcrFallback;
use crate::router::Router;
use crate::scanner::{self, HashMode};
use crate::selector::{LabelSelector, SelectionPolicy};
use crate::stopwords::StopwordSet;
use crate::taxonomy::Taxonomy;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Characters of content kept in the run log per document.
pub const PREVIEW_CHARS: usize = 120;

/// Extraction, OCR fallback and normalization for a single file.
pub struct SignalExtractor {
    dispatcher: ExtractionDispatcher,
    normalizer: Normalizer,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedSignal {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub text: String,
    pub ocr_used: bool,
    pub signal: String,
    pub failures: Vec<FailureRecord>,
}

impl SignalExtractor {
    pub fn new(dispatcher: ExtractionDispatcher, normalizer: Normalizer) -> Self {
        Self {
            dispatcher,
            normalizer,
        }
    }

    pub fn from_config(
        extraction: &ExtractionConfig,
        ocr: &OcrConfig,
        normalizer: &NormalizerConfig,
    ) -> Self {
        let stopwords =
            Arc::new(StopwordSet::bilingual().with_extra(normalizer.extra_stopwords.iter()));
        Self::new(
            ExtractionDispatcher::new(
                ExtractorRegistry::with_defaults(extraction.clone()),
                OcrFallback::from_config(ocr),
            ),
            Normalizer::new(stopwords, normalizer.max_chars),
        )
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn extract(&self, path: &Path) -> ExtractedSignal {
        self.extract_within(path, None)
    }

    /// Extractors check `deadline` between archive members, sheets and
    /// OCR pages and stop once it has passed.
    pub fn extract_within(&self, path: &Path, deadline: Option<std::time::Instant>) -> ExtractedSignal {
        let kind = DocumentKind::detect(path);
        let extracted = self.dispatcher.extract_document(path, kind, deadline);
        let failures = extracted
            .failures
            .into_iter()
            .map(|(stage, reason)| FailureRecord {
                path: path.to_path_buf(),
                stage,
                reason,
            })
            .collect();
        ExtractedSignal {
            path: path.to_path_buf(),
            kind,
            signal: self.normalizer.document_signal(path, &extracted.text),
            text: extracted.text,
            ocr_used: extracted.ocr_used,
            failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub hash: Option<String>,
    pub status: DocumentStatus,
    pub labels: Vec<String>,
    pub selection: Option<String>,
    pub probabilities: Vec<f32>,
    pub destinations: Vec<PathBuf>,
    pub ocr_used: bool,
    pub preview: String,
    /// Why the document was not archived.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: PathBuf,
    pub archive_root: PathBuf,
    pub dry_run: bool,
    pub threshold: f32,
    pub policy: SelectionPolicy,
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<FailureRecord>,
}

impl RunReport {
    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    pub fn document(&self, path: &Path) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.path == path)
    }
}

/// Everything a run needs, already loaded and validated.
pub struct PipelineParts {
    pub source: PathBuf,
    pub excludes: Vec<String>,
    pub hash_mode: HashMode,
    pub taxonomy: Taxonomy,
    pub extractor: Arc<SignalExtractor>,
    pub scorer: Scorer,
    pub selector: LabelSelector,
    pub router: Router,
    pub workers: usize,
    pub document_timeout: Duration,
}

pub struct Pipeline {
    parts: PipelineParts,
}

/// How one document's extraction ended.
enum Attempt {
    Done(ExtractedSignal),
    Failed(String),
    /// Still running when the deadline passed.
    Overran(JoinHandle<ExtractedSignal>),
}

impl Pipeline {
    pub fn new(mut parts: PipelineParts) -> Self {
        parts.workers = parts.workers.max(1);
        Self { parts }
    }

    /// Loads taxonomy and models up front; any failure here aborts before a
    /// single document is touched.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let taxonomy = Taxonomy::from_config(&cfg.taxonomy).context("loading taxonomy")?;
        let selector = LabelSelector::new(
            cfg.classification.thresholds.accept,
            cfg.classification.policy,
        )?;
        let encoder = features::load_encoder(&cfg.encoder).context("loading encoder")?;
        let model =
            features::load_model(&cfg.classifier, &taxonomy).context("loading classifier")?;
        let scorer = Scorer::new(encoder, model, &taxonomy, cfg.encoder.batch_size)?;
        info!(
            labels = taxonomy.len(),
            encoder = scorer.encoder_name(),
            dimension = scorer.dimension(),
            "models loaded"
        );

        let router = Router::new(
            cfg.archive_root(),
            Arc::new(ArchiveManager::new(cfg.archive.copy_then_delete)),
            cfg.archive.dry_run,
        );
        Ok(Self::new(PipelineParts {
            source: cfg.source_dir(),
            excludes: cfg.scan.exclude.clone(),
            hash_mode: HashMode::from(cfg.scan.hash_mode.as_deref().unwrap_or("")),
            taxonomy,
            extractor: Arc::new(SignalExtractor::from_config(
                &cfg.extraction,
                &cfg.ocr,
                &cfg.normalizer,
            )),
            scorer,
            selector,
            router,
            workers: cfg.pipeline.workers,
            document_timeout: Duration::from_secs(cfg.pipeline.document_timeout_secs),
        }))
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.parts.taxonomy
    }

    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let started_at = Utc::now();
        let p = &self.parts;
        info!("Starting scan of {}...", p.source.display());
        let items = scanner::scan(
            &p.source,
            &p.excludes,
            p.hash_mode,
            &[p.router.archive_root().to_path_buf()],
        )
        .await?;
        info!("Scan complete. Discovered {} files.", items.len());
        p.router.prepare(&p.taxonomy)?;

        let mut docs: Vec<Document> = items
            .into_iter()
            .map(|item| Document::new(item.path, item.hash))
            .collect();

        info!("Starting extraction phase...");
        self.extract_all(&mut docs).await;

        info!("Starting classification phase...");
        let live: Vec<usize> = (0..docs.len())
            .filter(|&i| docs[i].status != DocumentStatus::Failed)
            .collect();
        let signals: Vec<String> = live.iter().map(|&i| docs[i].signal.clone()).collect();
        let encoded = p.scorer.encode_all(&signals).await;
        for (&i, enc) in live.iter().zip(encoded) {
            if let Some(reason) = enc.fallback {
                docs[i].record_failure(Stage::Encoding, reason);
            }
            docs[i].features = enc.vector;
        }
        let vectors: Vec<Vec<f32>> = live.iter().map(|&i| docs[i].features.clone()).collect();
        for (&i, scored) in live.iter().zip(p.scorer.classify_all(&vectors)) {
            let doc = &mut docs[i];
            match scored {
                Ok(probs) => doc.probabilities = probs,
                Err(e) => {
                    doc.fail(Stage::Classification, e.to_string());
                    continue;
                }
            }
            match p.selector.select(&doc.probabilities) {
                Ok(sel) => doc.selection = Some(sel),
                Err(e) => doc.fail(Stage::Classification, e.to_string()),
            }
        }

        info!("Starting routing phase...");
        for doc in docs.iter_mut() {
            let Some(selection) = doc.selection.as_ref() else {
                continue;
            };
            let labels = self.label_names(&selection.labels());
            let outcome = p.router.route(&doc.path, &labels);
            match outcome.error {
                Some(e) => doc.fail(Stage::Move, e.to_string()),
                None => {
                    doc.destinations = outcome.destinations;
                    doc.status = if p.router.is_dry_run() {
                        DocumentStatus::Planned
                    } else {
                        DocumentStatus::Archived
                    };
                }
            }
        }

        let report = self.report(started_at, docs);
        info!(
            archived = report.count(DocumentStatus::Archived),
            planned = report.count(DocumentStatus::Planned),
            failed = report.count(DocumentStatus::Failed),
            "Run complete."
        );
        Ok(report)
    }

    /// Extracts every document on blocking workers, at most `workers` at a
    /// time. Each worker holds its permit until its extractor returns, so a
    /// document that overruns its deadline keeps its slot. Overrunning
    /// documents get one more timeout's grace; any still running after that
    /// are failed and left where they are.
    async fn extract_all(&self, docs: &mut [Document]) {
        let permits = Arc::new(Semaphore::new(self.parts.workers));
        let timeout = self.parts.document_timeout;
        let mut set = JoinSet::new();
        for (index, doc) in docs.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let extractor = Arc::clone(&self.parts.extractor);
            let path = doc.path.clone();
            set.spawn(async move {
                let Ok(permit) = permits.acquire_owned().await else {
                    return (index, Attempt::Failed("worker pool closed".into()));
                };
                let deadline = Instant::now() + timeout;
                let mut work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    extractor.extract_within(&path, Some(deadline.into_std()))
                });
                let attempt = match tokio::time::timeout_at(deadline, &mut work).await {
                    Ok(Ok(extracted)) => Attempt::Done(extracted),
                    Ok(Err(join_err)) => Attempt::Failed(format!("extraction task failed: {join_err}")),
                    Err(_) => Attempt::Overran(work),
                };
                (index, attempt)
            });
        }

        let mut overran = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok((index, attempt)) = joined else {
                continue;
            };
            let doc = &mut docs[index];
            match attempt {
                Attempt::Done(extracted) => {
                    for failure in extracted.failures {
                        doc.record_failure(failure.stage, failure.reason);
                    }
                    doc.kind = extracted.kind;
                    doc.raw_text = extracted.text;
                    doc.ocr_used = extracted.ocr_used;
                    doc.signal = extracted.signal;
                }
                Attempt::Failed(reason) => {
                    doc.record_failure(Stage::Extraction, reason);
                    doc.signal = self.parts.extractor.normalizer().file_signal(&doc.path);
                }
                Attempt::Overran(work) => {
                    doc.record_failure(
                        Stage::Extraction,
                        format!("timed out after {}s", timeout.as_secs_f32()),
                    );
                    doc.signal = self.parts.extractor.normalizer().file_signal(&doc.path);
                    overran.push((index, work));
                }
            }
            debug!(path = %doc.path.display(), signal = %doc.signal, "extracted");
        }

        let grace = Instant::now() + timeout;
        for (index, work) in overran {
            if tokio::time::timeout_at(grace, work).await.is_err() {
                let doc = &mut docs[index];
                warn!(path = %doc.path.display(), "extractor still running, not archiving");
                doc.fail(Stage::Move, "extraction still running; left in place");
            }
        }
    }

    fn label_names(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|i| self.parts.taxonomy.label(*i))
            .map(str::to_string)
            .collect()
    }

    fn report(&self, started_at: DateTime<Utc>, docs: Vec<Document>) -> RunReport {
        let p = &self.parts;
        let mut failures = Vec::new();
        let documents = docs
            .into_iter()
            .map(|doc| {
                let labels = doc
                    .selection
                    .as_ref()
                    .map(|s| self.label_names(&s.labels()))
                    .unwrap_or_default();
                let reason = if doc.status == DocumentStatus::Failed {
                    doc.failures.last().map(|f| format!("{}: {}", f.stage, f.reason))
                } else {
                    None
                };
                let report = DocumentReport {
                    kind: doc.kind,
                    hash: doc.hash.clone(),
                    status: doc.status,
                    labels,
                    selection: doc.selection.as_ref().map(|s| s.state().to_string()),
                    probabilities: doc.probabilities.clone(),
                    destinations: doc.destinations.clone(),
                    ocr_used: doc.ocr_used,
                    preview: doc.preview(PREVIEW_CHARS),
                    reason,
                    path: doc.path,
                };
                failures.extend(doc.failures);
                report
            })
            .collect();
        RunReport {
            started_at,
            finished_at: Utc::now(),
            source: p.source.clone(),
            archive_root: p.router.archive_root().to_path_buf(),
            dry_run: p.router.is_dry_run(),
            threshold: p.selector.threshold(),
            policy: p.selector.policy(),
            documents,
            failures,
        }
    }
}
