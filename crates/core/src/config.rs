//! Persisted tutor preferences.
//!
//! A single JSON blob holds the selected provider, one API key per provider
//! and the student's name. It is loaded once at startup and rewritten in full
//! whenever it changes.

use crate::error::TutorError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// The generative-AI backends a student can pick in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    #[default]
    Gemini,
    #[serde(rename = "OPENAI")]
    OpenAi,
    Grok,
}

impl ProviderKind {
    /// Name shown to the student.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Google AI",
            ProviderKind::OpenAi => "ChatGPT",
            ProviderKind::Grok => "Grok",
        }
    }

    /// Value stored in the settings file.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI",
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Grok => "GROK",
        }
    }

    /// Parses a stored provider value, mapping anything unknown or retired
    /// (such as `OLLAMA`) to the default provider.
    pub fn coerce(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "OPENAI" => ProviderKind::OpenAi,
            "GROK" => ProviderKind::Grok,
            "GEMINI" => ProviderKind::Gemini,
            other => {
                warn!(provider = %other, "Unknown provider in settings, using default");
                ProviderKind::default()
            }
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn coerce_provider<'de, D>(deserializer: D) -> Result<ProviderKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(ProviderKind::coerce)
        .unwrap_or_default())
}

/// The student's saved preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    #[serde(deserialize_with = "coerce_provider")]
    pub provider: ProviderKind,
    pub gemini_key: String,
    pub openai_key: String,
    pub grok_key: String,
    pub user_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            gemini_key: String::new(),
            openai_key: String::new(),
            grok_key: String::new(),
            user_name: "Student".to_string(),
        }
    }
}

impl AppConfig {
    /// The API key configured for `kind`, if any.
    pub fn key_for(&self, kind: ProviderKind) -> Option<&str> {
        let key = match kind {
            ProviderKind::Gemini => &self.gemini_key,
            ProviderKind::OpenAi => &self.openai_key,
            ProviderKind::Grok => &self.grok_key,
        };
        let key = key.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// File-backed holder of the current [`AppConfig`].
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<AppConfig>,
}

impl ConfigStore {
    /// Loads the configuration at `path`.
    ///
    /// A missing file yields `seed`, which is written out immediately. A file
    /// that is not valid JSON is replaced by `seed` as well, after a warning.
    pub fn load(path: impl Into<PathBuf>, seed: AppConfig) -> Result<Self, TutorError> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<AppConfig>(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Settings file is corrupt, using defaults");
                    seed
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file found, creating one");
                seed
            }
            Err(source) => return Err(TutorError::ConfigRead { path, source }),
        };

        let store = Self {
            path,
            current: RwLock::new(config.clone()),
        };
        store.persist(&config)?;
        Ok(store)
    }

    /// A store that is never written to disk; used by tests and previews.
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            path: PathBuf::new(),
            current: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the current configuration.
    pub fn current(&self) -> AppConfig {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the configuration and rewrites the file.
    pub fn update(&self, config: AppConfig) -> Result<AppConfig, TutorError> {
        self.persist(&config)?;
        match self.current.write() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        info!(provider = ?config.provider, "Settings updated");
        Ok(config)
    }

    fn persist(&self, config: &AppConfig) -> Result<(), TutorError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json).map_err(|source| TutorError::ConfigWrite {
            path: self.path.clone(),
            source,
        })
    }
}
