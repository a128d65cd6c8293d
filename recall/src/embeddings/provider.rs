use async_trait::async_trait;

use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{RecallError, Result};

use super::api::{default_base_url, ApiConfig, EmbeddingApiClient};

/// Turns query text into a vector for the similarity-based strategies.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder backed by an OpenAI-compatible HTTP endpoint.
#[derive(Clone)]
pub struct EmbeddingProvider {
    client: EmbeddingApiClient,
}

impl EmbeddingProvider {
    /// Accepts `provider/model` names (`ollama/nomic-embed-text`); bare names
    /// go to OpenAI. An explicit base URL wins over the provider default.
    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model) = parse_provider_model(&config.model);
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        tracing::info!(provider, model, base_url = %base_url, "Using embedding API");

        let client = EmbeddingApiClient::new(ApiConfig {
            base_url,
            api_key: config.api_key.clone(),
            model: model.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })?;
        Ok(Self { client })
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Embeds a sample once and checks its width against the index
    /// dimensionality.
    pub async fn verify_dimensions(&self, expected: usize) -> Result<()> {
        let actual = self.client.detect_dimensions().await?;
        if actual != expected {
            return Err(RecallError::Validation(format!(
                "Embedding model {} produces {actual} dimensions, index expects {expected}",
                self.model()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::Embedding("No embedding generated".to_string()))
    }
}
