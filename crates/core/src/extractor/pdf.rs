#[cfg(feature = "pdf")]
pub use self::text_layer::PdfExtractor;

#[cfg(feature = "pdf")]
mod text_layer {
    use crate::error::TriageError;
    use crate::extractor::{ExtractCx, Extractor};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::path::Path;
    use tracing::debug;

    /// Text layer of digital PDFs. Scanned pages come back empty and are left
    /// to the OCR fallback.
    pub struct PdfExtractor;

    impl Extractor for PdfExtractor {
        fn name(&self) -> &'static str {
            "pdf"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["pdf"]
        }

        fn extract(&self, path: &Path, _cx: &ExtractCx<'_>) -> Result<String, TriageError> {
            // pdf-extract panics on some malformed fonts and streams.
            let primary = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));
            match primary {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => debug!("pdf-extract failed for {}: {e}", path.display()),
                Err(_) => debug!("pdf-extract panicked on {}", path.display()),
            }
            page_text(path)
        }
    }

    fn page_text(path: &Path) -> Result<String, TriageError> {
        let doc = lopdf::Document::load(path).map_err(|e| TriageError::extraction(path, e))?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut out = String::new();
        for page in pages {
            match doc.extract_text(&[page]) {
                Ok(text) => out.push_str(&text),
                Err(e) => debug!("page {page} of {}: {e}", path.display()),
            }
        }
        Ok(out)
    }

}
