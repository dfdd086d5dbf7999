use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("extraction failed for {}: {reason}", .path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("unsupported format {format} for {}", .path.display())]
    Unsupported { path: PathBuf, format: String },

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("failed to move {} into {}: {source}", .src.display(), .dst.display())]
    Move {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid taxonomy: {0}")]
    Taxonomy(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TriageError {
    pub fn extraction(path: &Path, reason: impl std::fmt::Display) -> Self {
        TriageError::Extraction {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn moving(src: &Path, dst: &Path, source: std::io::Error) -> Self {
        TriageError::Move {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        }
    }
}

impl From<providers::ProviderError> for TriageError {
    fn from(err: providers::ProviderError) -> Self {
        match err {
            providers::ProviderError::ModelLoad { .. } => TriageError::ModelLoad(err.to_string()),
            other => TriageError::Encoding(other.to_string()),
        }
    }
}
