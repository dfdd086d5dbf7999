//! OCR fallback for documents whose structured text is too thin.
//!
//! A [`Rasterizer`] turns a document into page images one at a time; an
//! [`OcrEngine`] reads each page after grayscale and contrast stretching.
//! Page failures cost that page's text, never the document.

use crate::config::OcrConfig;
use crate::error::TriageError;
use crate::models::DocumentKind;
use image::{DynamicImage, GrayImage};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub mod raster;
#[cfg(feature = "ocr")]
pub mod tesseract;

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, page: &GrayImage) -> Result<String, TriageError>;
}

pub trait Rasterizer: Send + Sync {
    /// Calls `visit` once per page in order until it breaks. An `Err` return
    /// means the document could not be opened at all.
    fn for_each_page(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(usize, Result<DynamicImage, TriageError>) -> ControlFlow<()>,
    ) -> Result<(), TriageError>;
}

#[derive(Debug, Clone, Copy)]
pub struct OcrThresholds {
    pub min_chars_pdf: usize,
    pub min_chars_presentation: usize,
}

impl Default for OcrThresholds {
    fn default() -> Self {
        Self {
            min_chars_pdf: 40,
            min_chars_presentation: 20,
        }
    }
}

#[derive(Debug, Default)]
pub struct OcrOutcome {
    pub text: String,
    pub pages: usize,
    /// One entry per page that produced nothing because of an error.
    pub failures: Vec<String>,
}

#[derive(Clone)]
pub struct OcrFallback {
    enabled: bool,
    engine: Option<Arc<dyn OcrEngine>>,
    rasterizers: HashMap<DocumentKind, Arc<dyn Rasterizer>>,
    thresholds: OcrThresholds,
}

impl OcrFallback {
    /// Never triggers.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            engine: None,
            rasterizers: HashMap::new(),
            thresholds: OcrThresholds::default(),
        }
    }

    /// Enabled with the given engine and the built-in image and slide
    /// rasterizers. `None` keeps the thresholds active but reports every
    /// attempt as unavailable.
    pub fn new(engine: Option<Arc<dyn OcrEngine>>, thresholds: OcrThresholds) -> Self {
        let mut rasterizers: HashMap<DocumentKind, Arc<dyn Rasterizer>> = HashMap::new();
        rasterizers.insert(DocumentKind::Image, Arc::new(raster::ImageFileRasterizer));
        rasterizers.insert(
            DocumentKind::Presentation,
            Arc::new(raster::SlidePictureRasterizer),
        );
        Self {
            enabled: true,
            engine,
            rasterizers,
            thresholds,
        }
    }

    pub fn with_rasterizer(mut self, kind: DocumentKind, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizers.insert(kind, rasterizer);
        self
    }

    pub fn from_config(cfg: &OcrConfig) -> Self {
        if !cfg.enabled {
            return Self::disabled();
        }
        let thresholds = OcrThresholds {
            min_chars_pdf: cfg.min_chars_pdf,
            min_chars_presentation: cfg.min_chars_presentation,
        };
        build_native(cfg, thresholds)
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.engine.is_some()
    }

    pub fn needs_fallback(&self, kind: DocumentKind, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let chars = text.trim().chars().count();
        match kind {
            DocumentKind::Image => true,
            DocumentKind::Pdf => chars < self.thresholds.min_chars_pdf,
            DocumentKind::Presentation => chars < self.thresholds.min_chars_presentation,
            _ => false,
        }
    }

    /// Pages left when `deadline` passes are skipped and recorded as failures.
    pub fn ocr(
        &self,
        path: &Path,
        kind: DocumentKind,
        deadline: Option<Instant>,
    ) -> Result<OcrOutcome, TriageError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| TriageError::Recognition("no OCR engine available".into()))?;
        let rasterizer = self
            .rasterizers
            .get(&kind)
            .ok_or_else(|| TriageError::Recognition(format!("no rasterizer for {kind}")))?;

        let mut outcome = OcrOutcome::default();
        let mut texts = Vec::new();
        rasterizer.for_each_page(path, &mut |index, page| {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcome.failures.push(format!("page {}: time limit reached", index + 1));
                return ControlFlow::Break(());
            }
            outcome.pages += 1;
            let recognized = page.and_then(|img| engine.recognize(&prepare_for_recognition(&img)));
            match recognized {
                Ok(text) => texts.push(text.trim().to_string()),
                Err(err) => {
                    warn!(page = index + 1, "{}: {err}", path.display());
                    outcome.failures.push(format!("page {}: {err}", index + 1));
                }
            }
            ControlFlow::Continue(())
        })?;
        texts.retain(|t| !t.is_empty());
        outcome.text = texts.join("\n");
        debug!(
            engine = engine.name(),
            pages = outcome.pages,
            chars = outcome.text.chars().count(),
            "ocr finished for {}",
            path.display()
        );
        Ok(outcome)
    }
}

#[cfg(feature = "ocr")]
fn build_native(cfg: &OcrConfig, thresholds: OcrThresholds) -> OcrFallback {
    let engine = match tesseract::TesseractEngine::new(cfg) {
        Ok(engine) => Some(Arc::new(engine) as Arc<dyn OcrEngine>),
        Err(err) => {
            warn!("tesseract unavailable, OCR fallback will record failures: {err}");
            None
        }
    };
    OcrFallback::new(engine, thresholds).with_rasterizer(
        DocumentKind::Pdf,
        Arc::new(raster::PdfRasterizer::new(cfg.dpi, cfg.pdfium_library.clone())),
    )
}

#[cfg(not(feature = "ocr"))]
fn build_native(_cfg: &OcrConfig, thresholds: OcrThresholds) -> OcrFallback {
    debug!("built without the ocr feature; OCR fallback is unavailable");
    OcrFallback::new(None, thresholds)
}

/// Grayscale, then stretch the darkest pixel to black and the lightest to white.
pub fn prepare_for_recognition(img: &DynamicImage) -> GrayImage {
    let mut gray = img.to_luma8();
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return gray;
    }
    let span = f32::from(hi - lo);
    for p in gray.pixels_mut() {
        let v = f32::from(p.0[0] - lo) * 255.0 / span;
        p.0[0] = v.round() as u8;
    }
    gray
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed string per call and counts calls.
    pub(crate) struct ScriptedEngine {
        pub(crate) replies: Vec<Result<String, String>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedEngine {
        pub(crate) fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&self, _page: &GrayImage) -> Result<String, TriageError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(n) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(reason)) => Err(TriageError::Recognition(reason.clone())),
                None => Ok(String::new()),
            }
        }
    }

    /// A document of `pages` blank pages.
    pub(crate) struct BlankPages(pub(crate) usize);

    impl Rasterizer for BlankPages {
        fn for_each_page(
            &self,
            _path: &Path,
            visit: &mut dyn FnMut(usize, Result<DynamicImage, TriageError>) -> ControlFlow<()>,
        ) -> Result<(), TriageError> {
            for i in 0..self.0 {
                if visit(i, Ok(DynamicImage::new_luma8(4, 4))).is_break() {
                    break;
                }
            }
            Ok(())
        }
    }

    fn fallback(engine: Arc<ScriptedEngine>, pages: usize) -> OcrFallback {
        let engine: Arc<dyn OcrEngine> = engine;
        OcrFallback::new(Some(engine), OcrThresholds::default())
            .with_rasterizer(DocumentKind::Pdf, Arc::new(BlankPages(pages)))
    }

    #[test]
    fn thresholds_per_kind() {
        let ocr = OcrFallback::new(None, OcrThresholds::default());
        assert!(ocr.needs_fallback(DocumentKind::Image, "lots of text here anyway"));
        assert!(ocr.needs_fallback(DocumentKind::Pdf, &"x".repeat(39)));
        assert!(!ocr.needs_fallback(DocumentKind::Pdf, &"x".repeat(40)));
        assert!(ocr.needs_fallback(DocumentKind::Presentation, "short"));
        assert!(!ocr.needs_fallback(DocumentKind::Presentation, &"y".repeat(20)));
        assert!(!ocr.needs_fallback(DocumentKind::Text, ""));
        assert!(!OcrFallback::disabled().needs_fallback(DocumentKind::Image, ""));
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok("first".into()),
            Ok("second".into()),
        ]));
        let out = fallback(engine.clone(), 2)
            .ocr(Path::new("scan.pdf"), DocumentKind::Pdf, None)
            .unwrap();
        assert_eq!(out.text, "first\nsecond");
        assert_eq!(out.pages, 2);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_page_contributes_nothing() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Err("garbled".into()),
            Ok("kept".into()),
        ]));
        let out = fallback(engine, 2)
            .ocr(Path::new("scan.pdf"), DocumentKind::Pdf, None)
            .unwrap();
        assert_eq!(out.text, "kept");
        assert_eq!(out.failures.len(), 1);
        assert!(out.failures[0].starts_with("page 1"));
    }

    #[test]
    fn pages_after_the_deadline_are_skipped() {
        let engine = Arc::new(ScriptedEngine::new(vec![Ok("never".into())]));
        let past = Instant::now() - std::time::Duration::from_millis(1);
        let out = fallback(engine.clone(), 3)
            .ocr(Path::new("scan.pdf"), DocumentKind::Pdf, Some(past))
            .unwrap();
        assert_eq!(out.pages, 0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.failures, vec!["page 1: time limit reached".to_string()]);
    }

    #[test]
    fn missing_engine_is_an_error_not_a_panic() {
        let ocr = OcrFallback::new(None, OcrThresholds::default());
        assert!(ocr.ocr(Path::new("a.png"), DocumentKind::Image, None).is_err());
        assert!(!ocr.is_available());
    }

    #[test]
    fn contrast_is_stretched() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([150]));
        let out = prepare_for_recognition(&DynamicImage::ImageLuma8(img));
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn flat_image_is_left_alone() {
        let img = GrayImage::from_pixel(3, 3, Luma([77]));
        let out = prepare_for_recognition(&DynamicImage::ImageLuma8(img));
        assert!(out.pixels().all(|p| p.0[0] == 77));
    }
}
