//! Response providers: the generative-AI backends that turn a prompt, an
//! optional image and recent history into a single text response.

pub mod gemini;
pub mod openai;

use crate::config::ProviderKind;
use crate::error::ProviderError;
use crate::image::ImageAttachment;
use crate::message::HistoryEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a provider needs to produce one response.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    pub history: Vec<HistoryEntry>,
}

/// A generative backend.
///
/// The returned text may contain the chunk separator; everything else in it
/// is treated as opaque markdown/SVG.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    async fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, ProviderError>;
}

/// The providers that are actually implemented in this deployment. A kind
/// without an entry is announced to the student as coming soon.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn ResponseProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ProviderKind, provider: Arc<dyn ResponseProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ResponseProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_supported(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
