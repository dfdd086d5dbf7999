use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::selector::Selection;

/// Broad file family, detected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Text,
    WordProcessor,
    Presentation,
    Spreadsheet,
    Pdf,
    Image,
    Archive,
    Other,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "csv" | "tsv" | "log" | "json" | "xml" | "html" | "htm" | "yaml"
            | "yml" | "toml" | "ini" => DocumentKind::Text,
            "docx" | "doc" => DocumentKind::WordProcessor,
            "pptx" | "ppt" => DocumentKind::Presentation,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => DocumentKind::Spreadsheet,
            "pdf" => DocumentKind::Pdf,
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "webp" | "gif" => {
                DocumentKind::Image
            }
            "zip" | "tar" | "tgz" | "gz" | "rar" | "7z" => DocumentKind::Archive,
            _ => DocumentKind::Other,
        }
    }

    /// Extension first; magic bytes when the extension says nothing.
    pub fn detect(path: &Path) -> Self {
        let by_ext = extension_key(path)
            .map(|ext| Self::from_extension(&ext))
            .unwrap_or(DocumentKind::Other);
        if by_ext != DocumentKind::Other {
            return by_ext;
        }
        match infer::get_from_path(path) {
            Ok(Some(kind)) => Self::from_extension(kind.extension()),
            _ => DocumentKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::WordProcessor => "word_processor",
            DocumentKind::Presentation => "presentation",
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Archive => "archive",
            DocumentKind::Other => "other",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased extension used for extractor lookup. `a.tar.gz` maps to `tgz`.
pub fn extension_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if name.ends_with(".tar.gz") {
        return Some("tgz".to_string());
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Outcome of one extractor boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Text(String),
    Empty,
    Failed { reason: String },
}

impl Extraction {
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            Extraction::Empty
        } else {
            Extraction::Text(text)
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Extraction::Text(t) => t,
            _ => "",
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Extraction::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Recognition,
    Encoding,
    Classification,
    Move,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Recognition => "recognition",
            Stage::Encoding => "encoding",
            Stage::Classification => "classification",
            Stage::Move => "move",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Archived,
    /// Dry run: destinations computed, nothing moved.
    Planned,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Archived => "archived",
            DocumentStatus::Planned => "planned",
            DocumentStatus::Failed => "failed",
        }
    }
}

/// One file travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub hash: Option<String>,
    pub raw_text: String,
    pub ocr_used: bool,
    pub signal: String,
    pub features: Vec<f32>,
    pub probabilities: Vec<f32>,
    pub selection: Option<Selection>,
    pub destinations: Vec<PathBuf>,
    pub status: DocumentStatus,
    pub failures: Vec<FailureRecord>,
}

impl Document {
    pub fn new(path: PathBuf, hash: Option<String>) -> Self {
        let kind = DocumentKind::detect(&path);
        Self {
            path,
            kind,
            hash,
            raw_text: String::new(),
            ocr_used: false,
            signal: String::new(),
            features: Vec::new(),
            probabilities: Vec::new(),
            selection: None,
            destinations: Vec::new(),
            status: DocumentStatus::Pending,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(path = %self.path.display(), %stage, "{}", reason);
        self.failures.push(FailureRecord {
            path: self.path.clone(),
            stage,
            reason,
        });
    }

    pub fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        self.record_failure(stage, reason);
        self.status = DocumentStatus::Failed;
    }

    pub fn preview(&self, max_chars: usize) -> String {
        let source = if self.raw_text.trim().is_empty() {
            &self.signal
        } else {
            &self.raw_text
        };
        source
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(max_chars)
            .collect()
    }
}
