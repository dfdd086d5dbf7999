//! Lexical TF-IDF encoder over a vocabulary fitted at training time.

use crate::{FeatureEncoder, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    #[default]
    L2,
    L1,
    None,
}

/// On-disk form of a fitted vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfArtifact {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f32>,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default)]
    pub norm: Norm,
}

#[derive(Debug, Clone)]
pub struct TfidfEncoder {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    sublinear_tf: bool,
    norm: Norm,
}

impl TfidfEncoder {
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::model_load(display.clone(), e))?;
        let artifact: TfidfArtifact =
            serde_json::from_str(&raw).map_err(|e| ProviderError::model_load(display.clone(), e))?;
        Self::from_artifact(artifact).map_err(|e| ProviderError::model_load(display, e))
    }

    pub fn from_artifact(artifact: TfidfArtifact) -> Result<Self, ProviderError> {
        let dim = artifact.idf.len();
        if dim == 0 {
            return Err(ProviderError::Encoding("empty idf vector".into()));
        }
        if let Some((term, idx)) = artifact.vocabulary.iter().find(|(_, idx)| **idx >= dim) {
            return Err(ProviderError::Encoding(format!(
                "term {term:?} maps to column {idx} outside dimension {dim}"
            )));
        }
        if artifact.idf.iter().any(|w| !w.is_finite()) {
            return Err(ProviderError::Encoding("idf contains non-finite weights".into()));
        }
        Ok(Self {
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
        })
    }

    /// Encodes one text. Unknown terms are ignored; empty input yields zeros.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<usize, u32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *counts.entry(idx).or_default() += 1;
            }
        }
        let mut vector = vec![0.0f32; self.idf.len()];
        for (idx, count) in counts {
            let tf = if self.sublinear_tf {
                1.0 + (count as f32).ln()
            } else {
                count as f32
            };
            vector[idx] = tf * self.idf[idx];
        }
        normalize(&mut vector, self.norm);
        vector
    }
}

#[async_trait::async_trait]
impl FeatureEncoder for TfidfEncoder {
    fn name(&self) -> &str {
        "tfidf"
    }

    fn dimension(&self) -> usize {
        self.idf.len()
    }

    async fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.transform(t)).collect())
    }
}

/// Lowercased word tokens of at least two characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

fn normalize(vector: &mut [f32], norm: Norm) {
    let total = match norm {
        Norm::L2 => vector.iter().map(|v| v * v).sum::<f32>().sqrt(),
        Norm::L1 => vector.iter().map(|v| v.abs()).sum::<f32>(),
        Norm::None => return,
    };
    if total > 0.0 {
        for v in vector.iter_mut() {
            *v /= total;
        }
    }
}
