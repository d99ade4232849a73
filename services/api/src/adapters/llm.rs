//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for the chat-completion LLM used by every agent.
//! It implements the `LanguageModelService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use interview_core::ports::{CompletionRequest, LanguageModelService, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LanguageModelService` using an OpenAI chat model.
///
/// Built without a client when `OPENAI_API_KEY` is unset; every call then fails
/// with a configuration error instead of reaching the network.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiChatAdapter {
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn client(&self) -> PortResult<&Client<OpenAIConfig>> {
        self.client
            .as_ref()
            .ok_or_else(|| PortError::Configuration("OPENAI_API_KEY".to_string()))
    }
}

//=========================================================================================
// `LanguageModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageModelService for OpenAiChatAdapter {
    async fn complete(&self, request: CompletionRequest) -> PortResult<String> {
        let client = self.client()?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .n(1);
        if request.json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let chat_request = builder
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(model = %self.model, json_mode = request.json_mode, "Requesting chat completion");
        let response = client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream {
                status: 502,
                message: e.to_string(),
            })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Chat completion contained no text content.".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let adapter = OpenAiChatAdapter::new(None, "gpt-4o".into());
        let err = adapter
            .complete(CompletionRequest {
                system: "s".into(),
                user: "u".into(),
                temperature: 0.2,
                json_mode: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OPENAI_API_KEY is not configured");
    }
}
