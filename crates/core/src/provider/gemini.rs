//! Google Gemini over the Generative Language REST API.

use super::{GenerateRequest, ResponseProvider};
use crate::error::ProviderError;
use crate::message::MessageRole;
use async_trait::async_trait;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// --- Wire types for generateContent ---
mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateContentRequest {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system_instruction: Option<Content>,
        pub contents: Vec<Content>,
    }

    #[derive(Serialize, Debug)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<&'static str>,
        pub parts: Vec<Part>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Part {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub inline_data: Option<Blob>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    pub(super) struct GenerateContentResponse {
        pub candidates: Vec<Candidate>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    pub(super) struct Candidate {
        pub content: Option<CandidateContent>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    pub(super) struct CandidateContent {
        pub parts: Vec<CandidatePart>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    pub(super) struct CandidatePart {
        pub text: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ErrorEnvelope {
        pub error: ErrorBody,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ErrorBody {
        pub message: String,
    }
}

fn text_part(text: impl Into<String>) -> wire::Part {
    wire::Part {
        text: Some(text.into()),
        inline_data: None,
    }
}

/// Builds the `generateContent` body: system instruction, prior turns, then
/// the new user turn with the image (if any) ahead of the prompt text.
fn build_body(request: &GenerateRequest) -> wire::GenerateContentRequest {
    let mut contents: Vec<wire::Content> = request
        .history
        .iter()
        .map(|entry| wire::Content {
            role: Some(match entry.role {
                MessageRole::User => "user",
                _ => "model",
            }),
            parts: vec![text_part(entry.content.clone())],
        })
        .collect();

    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        parts.push(wire::Part {
            text: None,
            inline_data: Some(wire::Blob {
                mime_type: image.mime_type().to_string(),
                data: image.base64_data().to_string(),
            }),
        });
    }
    parts.push(text_part(request.prompt.clone()));
    contents.push(wire::Content {
        role: Some("user"),
        parts,
    });

    let system_instruction = (!request.system_prompt.trim().is_empty()).then(|| wire::Content {
        role: None,
        parts: vec![text_part(request.system_prompt.clone())],
    });

    wire::GenerateContentRequest {
        system_instruction,
        contents,
    }
}

/// Joins the text parts of the first candidate.
fn extract_text(response: wire::GenerateContentResponse) -> Result<String, ProviderError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}

/// Turns a non-success body into a readable message.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<wire::ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("Gemini request failed with status {status}"))
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, model)
    }

    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[async_trait]
impl ResponseProvider for GeminiProvider {
    async fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingKey { provider: "Gemini" });
        }

        let body = build_body(request);
        debug!(model = %self.model, turns = body.contents.len(), has_image = request.image.is_some(), "Sending Gemini request");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(status, &text);
            warn!(%status, %message, "Gemini request rejected");
            return Err(ProviderError::Api {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: wire::GenerateContentResponse = response.json().await?;
        extract_text(parsed)
    }
}
