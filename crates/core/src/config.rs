use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::selector::SelectionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scan: ScanPaths,
    pub archive: ArchiveConfig,
    pub taxonomy: TaxonomyConfig,
    pub encoder: EncoderConfig,
    pub classifier: ClassifierConfig,
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPaths {
    pub source: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub hash_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub root: String,
    #[serde(default)]
    pub dry_run: bool,
    /// Copy then delete instead of rename, for sources on another device.
    #[serde(default)]
    pub copy_then_delete: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub labels: Vec<String>,
    /// Text file with one label per line; used when `labels` is empty.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// `tfidf` or `openai`.
    pub kind: String,
    pub artifact: Option<String>,
    #[serde(default)]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub artifact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    pub thresholds: Thresholds,
    #[serde(default)]
    pub policy: SelectionPolicy,
}

/// The acceptance cutoff has no built-in value; every deployment states it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub accept: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters kept from any single extractor.
    pub max_chars: usize,
    pub archive_contents: bool,
    pub max_archive_depth: usize,
    pub max_archive_bytes: u64,
    /// Parent for container scratch directories; system temp dir when unset.
    pub scratch_root: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            archive_contents: true,
            max_archive_depth: 2,
            max_archive_bytes: 64 * 1024 * 1024,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    pub language: String,
    pub data_path: Option<String>,
    pub dpi: u32,
    pub min_chars_pdf: usize,
    pub min_chars_presentation: usize,
    /// Location of the pdfium shared library; system search path when unset.
    pub pdfium_library: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "chi_sim+eng".to_string(),
            data_path: None,
            dpi: 220,
            min_chars_pdf: 40,
            min_chars_presentation: 20,
            pdfium_library: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub max_chars: usize,
    pub extra_stopwords: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            extra_stopwords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub document_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            document_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "triage.db".to_string(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

impl AppConfig {
    pub fn source_dir(&self) -> PathBuf {
        PathBuf::from(&self.scan.source)
    }

    pub fn archive_root(&self) -> PathBuf {
        PathBuf::from(&self.archive.root)
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
