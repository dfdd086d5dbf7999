//! Model providers: feature encoders and multi-label classifiers.
//!
//! Both are consumed as pre-built artifacts. Encoders turn normalized text into
//! fixed-dimension vectors; label models turn vectors into one probability per
//! taxonomy label.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod linear;
pub mod openai;
pub mod tfidf;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to load model artifact {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl ProviderError {
    pub fn model_load(path: impl Into<String>, reason: impl ToString) -> Self {
        ProviderError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Maps text to vectors of a constant dimension.
///
/// Implementations must encode each text independently of the others in the
/// batch, so `encode_many` output never depends on input order.
#[async_trait::async_trait]
pub trait FeatureEncoder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.encode_many(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Encoding("encoder returned no vector".into()))
    }
}

/// Multi-label classifier over encoded vectors.
pub trait LabelModel: Send + Sync {
    /// Labels in the order of the probabilities returned by `predict_proba`.
    fn labels(&self) -> &[String];

    fn input_dimension(&self) -> usize;

    fn predict_proba(&self, vector: &[f32]) -> Result<Vec<f32>, ProviderError>;

    fn predict_proba_many(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ProviderError> {
        vectors.iter().map(|v| self.predict_proba(v)).collect()
    }
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    encoders: HashMap<String, Arc<dyn FeatureEncoder>>,
    pub preferred_encoder: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, name: &str, encoder: Arc<dyn FeatureEncoder>) -> Self {
        self.encoders.insert(name.to_string(), encoder);
        self
    }

    pub fn set_preferred_encoder(mut self, name: &str) -> Self {
        self.preferred_encoder = Some(name.to_string());
        self
    }

    pub fn encoder(&self, name: Option<&str>) -> Result<Arc<dyn FeatureEncoder>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_encoder.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no encoder configured".into()))?;
        self.encoders
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    pub fn encoder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.encoders.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tfidf::{TfidfArtifact, TfidfEncoder};

    fn tiny_encoder() -> Arc<dyn FeatureEncoder> {
        let artifact = TfidfArtifact {
            vocabulary: [("budget".to_string(), 0)].into_iter().collect(),
            idf: vec![1.0],
            sublinear_tf: false,
            norm: Default::default(),
        };
        Arc::new(TfidfEncoder::from_artifact(artifact).unwrap())
    }

    #[test]
    fn registry_resolves_preferred_encoder() {
        let reg = ProviderRegistry::new()
            .with_encoder("tfidf", tiny_encoder())
            .set_preferred_encoder("tfidf");
        assert_eq!(reg.encoder(None).unwrap().dimension(), 1);
        assert!(matches!(
            reg.encoder(Some("openai")),
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[test]
    fn registry_without_preference_errors() {
        let reg = ProviderRegistry::new().with_encoder("tfidf", tiny_encoder());
        assert!(reg.encoder(None).is_err());
        assert_eq!(reg.encoder_names(), vec!["tfidf".to_string()]);
    }
}
