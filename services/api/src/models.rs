//! API Models
//!
//! Request and response bodies of the REST endpoints, annotated for OpenAPI
//! generation with `utoipa`.

use serde::{Deserialize, Serialize};
use tutor_core::config::{AppConfig, ProviderKind};
use tutor_core::message::{HistoryEntry, MessageRole};
use utoipa::ToSchema;

/// One earlier chat turn sent with a generate request.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HistoryItem {
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
}

impl From<&HistoryItem> for HistoryEntry {
    fn from(item: &HistoryItem) -> Self {
        let role = match item.role.as_str() {
            "user" => MessageRole::User,
            _ => MessageRole::Assistant,
        };
        HistoryEntry {
            role,
            content: item.content.clone(),
        }
    }
}

/// Body of the server-mediated generate endpoint.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratePayload {
    #[schema(example = "Explain sin theta")]
    pub prompt: Option<String>,
    /// An image as a `data:<mime>;base64,<payload>` URL.
    pub image_base64: Option<String>,
    pub history: Vec<HistoryItem>,
    /// Replaces the built-in tutor prompt when present.
    pub system_prompt: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct GenerateResponse {
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// The persisted tutor preferences as exposed over REST.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// One of `GEMINI`, `OPENAI` or `GROK`. Anything else becomes `GEMINI`.
    #[schema(example = "GEMINI")]
    pub provider: String,
    pub gemini_key: String,
    pub openai_key: String,
    pub grok_key: String,
    #[schema(example = "Student")]
    pub user_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        AppConfig::default().into()
    }
}

impl From<AppConfig> for Settings {
    fn from(config: AppConfig) -> Self {
        Self {
            provider: config.provider.code().to_string(),
            gemini_key: config.gemini_key,
            openai_key: config.openai_key,
            grok_key: config.grok_key,
            user_name: config.user_name,
        }
    }
}

impl From<Settings> for AppConfig {
    fn from(settings: Settings) -> Self {
        Self {
            provider: ProviderKind::coerce(&settings.provider),
            gemini_key: settings.gemini_key,
            openai_key: settings.openai_key,
            grok_key: settings.grok_key,
            user_name: settings.user_name,
        }
    }
}
