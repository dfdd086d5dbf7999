use super::{ExtractCx, Extractor};
use crate::error::TriageError;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Plain text, read lossily; only a budget's worth of bytes is touched.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            "txt", "md", "csv", "tsv", "log", "json", "xml", "html", "htm", "yaml", "yml",
            "toml", "ini",
        ]
    }

    fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        let file = fs::File::open(path).map_err(|e| TriageError::extraction(path, e))?;
        // UTF-8 needs at most four bytes per character.
        let limit = cx.budget.saturating_mul(4) as u64;
        let mut buf = Vec::new();
        file.take(limit)
            .read_to_end(&mut buf)
            .map_err(|e| TriageError::extraction(path, e))?;
        let text = String::from_utf8_lossy(&buf);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ExtractionConfig;
    use crate::extractor::ExtractorRegistry;
    use crate::models::Extraction;

    #[test]
    fn reads_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.txt");
        std::fs::write(&path, "\u{feff}Annual Report 2024 Finance Budget").unwrap();
        let reg = ExtractorRegistry::with_defaults(ExtractionConfig {
            max_chars: 13,
            ..ExtractionConfig::default()
        });
        assert_eq!(reg.extract(&path), Extraction::Text("Annual Report".into()));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.log");
        std::fs::write(&path, b"ok \xff\xfe bytes").unwrap();
        let reg = ExtractorRegistry::with_defaults(ExtractionConfig::default());
        assert!(reg.extract(&path).text().starts_with("ok "));
    }

    #[test]
    fn empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, "  \n").unwrap();
        let reg = ExtractorRegistry::with_defaults(ExtractionConfig::default());
        assert_eq!(reg.extract(&path), Extraction::Empty);
    }
}
