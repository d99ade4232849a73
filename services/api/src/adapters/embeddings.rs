//! services/api/src/adapters/embeddings.rs
//!
//! Embedding adapter over the OpenAI embeddings endpoint.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::embeddings::CreateEmbeddingRequestArgs,
    Client,
};
use async_trait::async_trait;
use interview_core::ports::{EmbeddingService, PortError, PortResult};

#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingAdapter {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PortError::Configuration("OPENAI_API_KEY".to_string()))?;

        if text.trim().is_empty() {
            return Err(PortError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream {
                status: 502,
                message: e.to_string(),
            })?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| PortError::Unexpected("Embedding response was empty".to_string()))
    }
}
