use super::OcrEngine;
use crate::config::OcrConfig;
use crate::error::TriageError;
use image::{GrayImage, ImageFormat};
use leptess::LepTess;
use std::io::Cursor;

/// Tesseract through leptess. A fresh handle is made per page because the
/// underlying API object cannot be shared across threads.
pub struct TesseractEngine {
    data_path: Option<String>,
    language: String,
    dpi: u32,
}

impl TesseractEngine {
    /// Fails early when the language data cannot be loaded.
    pub fn new(cfg: &OcrConfig) -> Result<Self, TriageError> {
        let engine = Self {
            data_path: cfg.data_path.clone(),
            language: cfg.language.clone(),
            dpi: cfg.dpi,
        };
        engine.handle()?;
        Ok(engine)
    }

    fn handle(&self) -> Result<LepTess, TriageError> {
        LepTess::new(self.data_path.as_deref(), &self.language).map_err(|e| {
            TriageError::Recognition(format!("tesseract init ({}): {e}", self.language))
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, page: &GrayImage) -> Result<String, TriageError> {
        let mut png = Cursor::new(Vec::new());
        page.write_to(&mut png, ImageFormat::Png)
            .map_err(|e| TriageError::Recognition(format!("png encode: {e}")))?;
        let mut lt = self.handle()?;
        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| TriageError::Recognition(format!("load page: {e}")))?;
        lt.set_source_resolution(self.dpi as i32);
        lt.get_utf8_text()
            .map_err(|e| TriageError::Recognition(format!("decode text: {e}")))
    }
}
