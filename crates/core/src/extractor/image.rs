use super::{ExtractCx, Extractor};
use crate::error::TriageError;
use std::path::Path;

/// Images carry no structured text; recognition is the OCR fallback's job.
pub struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "gif"]
    }

    fn extract(&self, path: &Path, _cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        if !path.is_file() {
            return Err(TriageError::extraction(path, "not a readable file"));
        }
        Ok(String::new())
    }
}
