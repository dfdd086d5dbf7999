//! Text extraction: a registry of per-format extractors behind one boundary.
//!
//! Every extractor returns `Result<String, TriageError>`; the registry turns
//! errors and panics into [`Extraction::Failed`] so a broken file never stops
//! the batch. The dispatcher adds the OCR fallback on top.

use crate::config::ExtractionConfig;
use crate::error::TriageError;
use crate::models::{extension_key, DocumentKind, Extraction, Stage};
use crate::ocr::OcrFallback;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub mod archive;
pub mod image;
pub mod office;
pub mod pdf;
pub mod text;

/// What an extractor sees besides the path.
pub struct ExtractCx<'a> {
    pub registry: &'a ExtractorRegistry,
    pub settings: &'a ExtractionConfig,
    /// Container nesting level; 0 for files found by the scanner.
    pub depth: usize,
    pub budget: usize,
    /// Long-running extractors stop at their next checkpoint once this passes.
    pub deadline: Option<Instant>,
}

impl ExtractCx<'_> {
    /// Extracts a container member one level deeper.
    pub fn nested(&self, path: &Path) -> Extraction {
        self.registry
            .extract_at(path, self.budget, self.depth + 1, self.deadline)
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check_deadline(&self, path: &Path) -> Result<(), TriageError> {
        if self.expired() {
            return Err(TriageError::extraction(path, "time limit reached"));
        }
        Ok(())
    }
}

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];
    fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError>;
}

#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
    settings: ExtractionConfig,
}

impl ExtractorRegistry {
    pub fn new(settings: ExtractionConfig) -> Self {
        Self {
            by_extension: HashMap::new(),
            settings,
        }
    }

    /// Registry with every extractor compiled into this build.
    pub fn with_defaults(settings: ExtractionConfig) -> Self {
        let mut reg = Self::new(settings);
        reg.register(Arc::new(text::PlainTextExtractor));
        reg.register(Arc::new(office::PresentationExtractor));
        #[cfg(feature = "office")]
        {
            reg.register(Arc::new(office::WordExtractor));
            reg.register(Arc::new(office::SpreadsheetExtractor));
        }
        #[cfg(feature = "pdf")]
        reg.register(Arc::new(pdf::PdfExtractor));
        reg.register(Arc::new(image::ImageExtractor));
        reg.register(Arc::new(archive::ZipExtractor));
        reg.register(Arc::new(archive::TarExtractor));
        reg.register(Arc::new(archive::UnsupportedArchiveExtractor));
        #[cfg(feature = "archives")]
        {
            reg.register(Arc::new(archive::RarExtractor));
            reg.register(Arc::new(archive::SevenZipExtractor));
        }
        reg
    }

    /// Later registrations win for a shared extension.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for ext in extractor.extensions() {
            self.by_extension
                .insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    pub fn get(&self, path: &Path) -> Option<Arc<dyn Extractor>> {
        extension_key(path).and_then(|ext| self.by_extension.get(&ext).cloned())
    }

    pub fn settings(&self) -> &ExtractionConfig {
        &self.settings
    }

    pub fn extract(&self, path: &Path) -> Extraction {
        self.extract_until(path, None)
    }

    pub fn extract_until(&self, path: &Path, deadline: Option<Instant>) -> Extraction {
        self.extract_at(path, self.settings.max_chars, 0, deadline)
    }

    pub(crate) fn extract_at(
        &self,
        path: &Path,
        budget: usize,
        depth: usize,
        deadline: Option<Instant>,
    ) -> Extraction {
        let Some(extractor) = self.get(path) else {
            debug!("no extractor for {}", path.display());
            return Extraction::Empty;
        };
        let cx = ExtractCx {
            registry: self,
            settings: &self.settings,
            depth,
            budget,
            deadline,
        };
        match catch_unwind(AssertUnwindSafe(|| extractor.extract(path, &cx))) {
            Ok(Ok(text)) => Extraction::from_text(truncate_chars(&text, budget)),
            Ok(Err(err)) => {
                warn!(extractor = extractor.name(), "{}", err);
                Extraction::Failed {
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    extractor = extractor.name(),
                    "extractor panicked on {}",
                    path.display()
                );
                Extraction::Failed {
                    reason: format!("{} extractor panicked", extractor.name()),
                }
            }
        }
    }
}

/// Text of one document plus everything that went wrong producing it.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub ocr_used: bool,
    pub failures: Vec<(Stage, String)>,
}

/// Structured extraction with OCR when the text is too thin.
pub struct ExtractionDispatcher {
    registry: ExtractorRegistry,
    ocr: OcrFallback,
}

impl ExtractionDispatcher {
    pub fn new(registry: ExtractorRegistry, ocr: OcrFallback) -> Self {
        Self { registry, ocr }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn extract_document(
        &self,
        path: &Path,
        kind: DocumentKind,
        deadline: Option<Instant>,
    ) -> ExtractedText {
        let mut out = ExtractedText::default();
        let extraction = self.registry.extract_until(path, deadline);
        if let Some(reason) = extraction.failure() {
            out.failures.push((Stage::Extraction, reason.to_string()));
        }
        out.text = extraction.text().to_string();

        if !self.ocr.needs_fallback(kind, &out.text) {
            return out;
        }
        debug!("text below threshold for {}, trying OCR", path.display());
        match self.ocr.ocr(path, kind, deadline) {
            Ok(outcome) => {
                for failure in outcome.failures {
                    out.failures.push((Stage::Recognition, failure));
                }
                let recognized = truncate_chars(&outcome.text, self.registry.settings.max_chars);
                if !recognized.trim().is_empty() {
                    out.text = recognized;
                    out.ocr_used = true;
                }
            }
            Err(err) => out.failures.push((Stage::Recognition, err.to_string())),
        }
        out
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
