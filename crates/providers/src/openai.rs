use crate::{FeatureEncoder, ProviderError};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

/// Dense sentence embeddings served by an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Clone)]
pub struct OpenAiEncoder {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiEncoder {
    pub fn new(cfg: OpenAiConfig) -> Result<Self, ProviderError> {
        if cfg.dimensions == 0 {
            return Err(ProviderError::model_load(
                cfg.model.clone(),
                "embedding dimension must be configured",
            ));
        }
        Ok(Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl FeatureEncoder for OpenAiEncoder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.cfg.dimensions
    }

    async fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: Vec<&'a str>,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }
        // The endpoint rejects empty strings.
        let input = texts
            .iter()
            .map(|t| if t.trim().is_empty() { " " } else { t.as_str() })
            .collect();
        let body = EmbedRequest {
            model: &self.cfg.model,
            input,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/embeddings", self.cfg.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let mut parsed: EmbeddingApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::Encoding(format!(
                "asked for {} embeddings, received {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        let expected = self.cfg.dimensions;
        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() == expected {
                    Ok(d.embedding)
                } else {
                    Err(ProviderError::DimensionMismatch {
                        expected,
                        actual: d.embedding.len(),
                    })
                }
            })
            .collect()
    }
}
