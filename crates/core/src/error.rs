//! Error types shared across the tutoring core.
//!
//! The `Display` output of every variant is written for the student: it is
//! placed verbatim inside system chat messages.

use std::path::PathBuf;

/// Failures produced by a [`ResponseProvider`](crate::provider::ResponseProvider).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No API key is configured for the selected provider.
    #[error("{provider} API Key is required")]
    MissingKey { provider: &'static str },
    /// The request never reached the provider or the connection broke.
    #[error("Network error: {0}")]
    Transport(String),
    /// The provider rejected the request.
    #[error("{message}")]
    Api {
        status: Option<u16>,
        message: String,
    },
    /// The provider answered but the body could not be understood.
    #[error("Malformed response from provider: {0}")]
    Malformed(String),
    /// The provider answered with no text at all.
    #[error("AI returned empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Failures of the tutoring session that are not provider failures.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("Attached file is not a valid image: {0}")]
    InvalidImage(String),
    #[error("Voice input not supported in this browser.")]
    SpeechInputUnavailable,
    #[error("Could not read settings from '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not write settings to '{path}': {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Settings are not valid JSON: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}
