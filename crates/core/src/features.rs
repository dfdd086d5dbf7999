//! Encoding and classification of normalized signals.

use crate::config::{ClassifierConfig, EncoderConfig};
use crate::error::TriageError;
use crate::taxonomy::Taxonomy;
use providers::linear::OneVsRestLinear;
use providers::openai::{OpenAiConfig, OpenAiEncoder};
use providers::tfidf::TfidfEncoder;
use providers::{FeatureEncoder, LabelModel, ProviderRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the configured encoder. Any problem here stops the run.
pub fn load_encoder(cfg: &EncoderConfig) -> Result<Arc<dyn FeatureEncoder>, TriageError> {
    let mut registry = ProviderRegistry::new();
    match cfg.kind.as_str() {
        "tfidf" => {
            let artifact = cfg
                .artifact
                .as_deref()
                .ok_or_else(|| TriageError::ModelLoad("encoder.artifact is required for tfidf".into()))?;
            registry = registry.with_encoder("tfidf", Arc::new(TfidfEncoder::load(Path::new(artifact))?));
        }
        "openai" => {
            let encoder = OpenAiEncoder::new(OpenAiConfig {
                api_key: std::env::var("OPENAI_API_KEY").ok(),
                base_url: cfg
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                model: cfg.model.clone(),
                dimensions: cfg.dimensions,
            })?;
            registry = registry.with_encoder("openai", Arc::new(encoder));
        }
        _ => {}
    }
    registry
        .set_preferred_encoder(&cfg.kind)
        .encoder(None)
        .map_err(|e| TriageError::ModelLoad(e.to_string()))
}

/// Loads the classifier with its outputs reordered to the taxonomy.
pub fn load_model(cfg: &ClassifierConfig, taxonomy: &Taxonomy) -> Result<Arc<dyn LabelModel>, TriageError> {
    let model = OneVsRestLinear::load(Path::new(&cfg.artifact))?
        .aligned_to(taxonomy.labels())
        .map_err(|e| TriageError::ModelLoad(format!("{}: {e}", cfg.artifact)))?;
    Ok(Arc::new(model))
}

/// An encoded signal, with the reason when a fallback had to be used.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub vector: Vec<f32>,
    pub fallback: Option<String>,
}

pub struct Scorer {
    encoder: Arc<dyn FeatureEncoder>,
    model: Arc<dyn LabelModel>,
    batch_size: usize,
}

impl Scorer {
    /// Checks that the encoder feeds the model and the model speaks the
    /// taxonomy before anything is scored.
    pub fn new(
        encoder: Arc<dyn FeatureEncoder>,
        model: Arc<dyn LabelModel>,
        taxonomy: &Taxonomy,
        batch_size: usize,
    ) -> Result<Self, TriageError> {
        if model.labels() != taxonomy.labels() {
            return Err(TriageError::ModelLoad(format!(
                "classifier labels {:?} do not match the taxonomy {:?}",
                model.labels(),
                taxonomy.labels()
            )));
        }
        if encoder.dimension() != model.input_dimension() {
            return Err(TriageError::ModelLoad(format!(
                "{} encoder produces {} features, classifier expects {}",
                encoder.name(),
                encoder.dimension(),
                model.input_dimension()
            )));
        }
        Ok(Self {
            encoder,
            model,
            batch_size: batch_size.max(1),
        })
    }

    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// One vector per text, in input order. Never fails: a bad batch is
    /// retried document by document, a bad document falls back to the empty
    /// signal and finally to a zero vector.
    pub async fn encode_all(&self, texts: &[String]) -> Vec<Encoded> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            match self.encoder.encode_many(chunk).await {
                Ok(vectors) if self.batch_is_valid(chunk, &vectors) => {
                    out.extend(vectors.into_iter().map(|vector| Encoded {
                        vector,
                        fallback: None,
                    }));
                }
                result => {
                    if let Err(e) = result {
                        debug!("batch of {} failed ({e}), encoding one by one", chunk.len());
                    }
                    for text in chunk {
                        out.push(self.encode_one(text).await);
                    }
                }
            }
        }
        out
    }

    async fn encode_one(&self, text: &str) -> Encoded {
        let reason = match self.encoder.encode(text).await {
            Ok(v) if v.len() == self.dimension() => return Encoded { vector: v, fallback: None },
            Ok(v) => format!("expected {} features, got {}", self.dimension(), v.len()),
            Err(e) => e.to_string(),
        };
        warn!("encoding failed, using the empty signal: {reason}");
        match self.encoder.encode("").await {
            Ok(v) if v.len() == self.dimension() => Encoded {
                vector: v,
                fallback: Some(reason),
            },
            _ => Encoded {
                vector: vec![0.0; self.dimension()],
                fallback: Some(format!("{reason}; empty signal failed too, using zeros")),
            },
        }
    }

    fn batch_is_valid(&self, chunk: &[String], vectors: &[Vec<f32>]) -> bool {
        vectors.len() == chunk.len() && vectors.iter().all(|v| v.len() == self.dimension())
    }

    /// One probability per taxonomy label, each in `[0, 1]`.
    /// Probabilities for every vector, predicted `batch_size` at a time. A
    /// failed batch is retried vector by vector so only the bad ones fail.
    pub fn classify_all(&self, vectors: &[Vec<f32>]) -> Vec<Result<Vec<f32>, TriageError>> {
        let mut out = Vec::with_capacity(vectors.len());
        for chunk in vectors.chunks(self.batch_size) {
            match self.model.predict_proba_many(chunk) {
                Ok(batch) if batch.len() == chunk.len() => {
                    out.extend(batch.into_iter().map(|probs| self.checked(probs)));
                }
                Ok(batch) => {
                    debug!("classifier returned {} rows for {}, retrying one by one", batch.len(), chunk.len());
                    out.extend(chunk.iter().map(|v| self.classify(v)));
                }
                Err(e) => {
                    debug!("batch of {} failed to classify ({e}), retrying one by one", chunk.len());
                    out.extend(chunk.iter().map(|v| self.classify(v)));
                }
            }
        }
        out
    }

    pub fn classify(&self, vector: &[f32]) -> Result<Vec<f32>, TriageError> {
        let probs = self
            .model
            .predict_proba(vector)
            .map_err(|e| TriageError::Classification(e.to_string()))?;
        self.checked(probs)
    }

    fn checked(&self, probs: Vec<f32>) -> Result<Vec<f32>, TriageError> {
        if probs.len() != self.model.labels().len() {
            return Err(TriageError::Classification(format!(
                "expected {} probabilities, got {}",
                self.model.labels().len(),
                probs.len()
            )));
        }
        Ok(probs
            .into_iter()
            .map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use providers::linear::LinearArtifact;
    use providers::ProviderError;

    /// Keyword-count encoder: one feature per keyword. Fails on texts
    /// containing `poison`, and on every text when `broken` is set.
    pub(crate) struct KeywordEncoder {
        pub(crate) keywords: Vec<String>,
        pub(crate) broken: bool,
    }

    #[async_trait::async_trait]
    impl FeatureEncoder for KeywordEncoder {
        fn name(&self) -> &str {
            "keywords"
        }

        fn dimension(&self) -> usize {
            self.keywords.len()
        }

        async fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            texts
                .iter()
                .map(|t| {
                    if self.broken || t.contains("poison") {
                        return Err(ProviderError::Encoding("cannot encode".into()));
                    }
                    Ok(self
                        .keywords
                        .iter()
                        .map(|k| t.split_whitespace().filter(|w| w == k).count() as f32)
                        .collect())
                })
                .collect()
        }
    }

    pub(crate) fn model(labels: &[&str], weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Arc<dyn LabelModel> {
        Arc::new(
            OneVsRestLinear::from_artifact(LinearArtifact {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                weights,
                bias,
            })
            .unwrap(),
        )
    }

    fn scorer(broken: bool) -> Scorer {
        let encoder = Arc::new(KeywordEncoder {
            keywords: vec!["budget".into(), "company".into()],
            broken,
        });
        let taxonomy = Taxonomy::new(["finance", "external"]).unwrap();
        let model = model(
            &["finance", "external"],
            vec![vec![4.0, 0.0], vec![0.0, 4.0]],
            vec![-2.0, -2.0],
        );
        Scorer::new(encoder, model, &taxonomy, 2).unwrap()
    }

    #[tokio::test]
    async fn poisoned_document_does_not_spoil_its_batch() {
        let s = scorer(false);
        let texts = vec![
            "budget budget".to_string(),
            "poison".to_string(),
            "company".to_string(),
        ];
        let encoded = s.encode_all(&texts).await;
        assert_eq!(encoded.len(), 3);
        assert_eq!(encoded[0].vector, vec![2.0, 0.0]);
        assert!(encoded[0].fallback.is_none());
        assert_eq!(encoded[1].vector, vec![0.0, 0.0]);
        assert!(encoded[1].fallback.is_some());
        assert_eq!(encoded[2].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn broken_encoder_yields_zero_vectors() {
        let s = scorer(true);
        let encoded = s.encode_all(&["budget".to_string(), String::new()]).await;
        for e in &encoded {
            assert_eq!(e.vector.len(), s.dimension());
            assert!(e.vector.iter().all(|x| *x == 0.0));
            assert!(e.fallback.as_deref().unwrap().contains("zeros"));
        }
    }

    #[tokio::test]
    async fn probabilities_follow_the_taxonomy() {
        let s = scorer(false);
        let encoded = s.encode_all(&["budget budget".to_string()]).await;
        let probs = s.classify(&encoded[0].vector).unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(probs[0] > 0.5 && probs[1] < 0.5);
    }

    #[test]
    fn batched_classification_isolates_bad_vectors() {
        let s = scorer(false);
        let vectors = vec![vec![2.0, 0.0], vec![1.0], vec![0.0, 1.0]];
        let probs = s.classify_all(&vectors);
        assert_eq!(probs.len(), 3);
        assert!(probs[0].as_ref().unwrap()[0] > 0.5);
        assert!(matches!(probs[1], Err(TriageError::Classification(_))));
        assert!(probs[2].as_ref().unwrap()[1] > 0.5);
    }

    #[test]
    fn mismatched_labels_are_fatal() {
        let encoder = Arc::new(KeywordEncoder {
            keywords: vec!["x".into()],
            broken: false,
        });
        let taxonomy = Taxonomy::new(["a", "b"]).unwrap();
        let m = model(&["b", "a"], vec![vec![1.0], vec![1.0]], vec![0.0, 0.0]);
        assert!(matches!(
            Scorer::new(encoder, m, &taxonomy, 8),
            Err(TriageError::ModelLoad(_))
        ));
    }

    #[test]
    fn mismatched_dimension_is_fatal() {
        let encoder = Arc::new(KeywordEncoder {
            keywords: vec!["x".into(), "y".into(), "z".into()],
            broken: false,
        });
        let taxonomy = Taxonomy::new(["a"]).unwrap();
        let m = model(&["a"], vec![vec![1.0, 1.0]], vec![0.0]);
        assert!(Scorer::new(encoder, m, &taxonomy, 8).is_err());
    }

    #[test]
    fn unknown_encoder_kind_is_a_load_error() {
        let cfg = EncoderConfig {
            kind: "word2vec".into(),
            artifact: None,
            model: String::new(),
            base_url: None,
            dimensions: 0,
            batch_size: 32,
        };
        assert!(matches!(load_encoder(&cfg), Err(TriageError::ModelLoad(_))));
    }

    #[test]
    fn classifier_labels_outside_taxonomy_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clf.json");
        std::fs::write(
            &path,
            r#"{"labels":["a","rogue"],"weights":[[1.0],[1.0]],"bias":[0.0,0.0]}"#,
        )
        .unwrap();
        let taxonomy = Taxonomy::new(["a", "b"]).unwrap();
        let cfg = ClassifierConfig {
            artifact: path.to_string_lossy().into_owned(),
        };
        assert!(matches!(load_model(&cfg, &taxonomy), Err(TriageError::ModelLoad(_))));
    }
}
