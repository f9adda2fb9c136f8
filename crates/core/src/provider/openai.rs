//! ChatGPT through any OpenAI-compatible chat completions API.

use super::{GenerateRequest, ResponseProvider};
use crate::error::ProviderError;
use crate::message::MessageRole;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const MAX_COMPLETION_TOKENS: u32 = 1000;

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::ApiError(api) => ProviderError::Api {
                status: None,
                message: api.message,
            },
            OpenAIError::Reqwest(e) => ProviderError::Transport(e.to_string()),
            OpenAIError::JSONDeserialize(e) => ProviderError::Malformed(e.to_string()),
            other => ProviderError::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_base: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, model)
    }

    pub fn with_api_base(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
        }
    }

    /// Builds the chat completion request: system prompt, prior turns, then
    /// the user turn, which becomes a text + image part list when an image is
    /// attached.
    fn build_request(&self, request: &GenerateRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt.clone())
                .build()?
                .into(),
        ];

        for entry in &request.history {
            let message: ChatCompletionRequestMessage = match entry.role {
                MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(entry.content.clone())
                    .build()?
                    .into(),
                _ => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(entry.content.clone())
                    .build()?
                    .into(),
            };
            messages.push(message);
        }

        let user_message = match &request.image {
            Some(image) => {
                let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(request.prompt.clone())
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(ImageUrlArgs::default().url(image.to_data_url()).build()?)
                        .build()?
                        .into(),
                ];
                ChatCompletionRequestUserMessageArgs::default()
                    .content(parts)
                    .build()?
            }
            None => ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()?,
        };
        messages.push(user_message.into());

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(MAX_COMPLETION_TOKENS)
            .build()
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[async_trait]
impl ResponseProvider for OpenAiProvider {
    async fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingKey { provider: "OpenAI" });
        }

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&self.api_base);
        let client = Client::with_config(config);

        let chat_request = self.build_request(request)?;
        debug!(model = %self.model, messages = chat_request.messages.len(), "Sending chat completion request");

        let response = client.chat().create(chat_request).await.map_err(|e| {
            warn!(error = %e, "Chat completion failed");
            ProviderError::from(e)
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}
