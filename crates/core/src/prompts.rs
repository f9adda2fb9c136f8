//! Prompt text sent to response providers.

use crate::config::ProviderKind;
use crate::engine::DoubtContext;

/// Persona and output conventions for the tutor.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.md");

/// Prompt used when the student attaches an image without typing anything.
pub const DEFAULT_IMAGE_PROMPT: &str = "Explain this image";

/// Wraps a student's doubt with the position the lecture was interrupted at.
pub fn doubt_prompt(context: DoubtContext, doubt: &str) -> String {
    format!(
        "(Context: User interrupted lecture at step {}/{}). STUDENT DOUBT: {}. Answer the doubt, then ask if we should continue.",
        context.step, context.total, doubt
    )
}

/// Chat notice for a provider the student selected but that is not built yet.
pub fn coming_soon_notice(kind: ProviderKind) -> String {
    format!(
        "🚧 **Coming Soon:** support for {} is under active development. Please switch to **Google AI** in settings to continue learning.",
        kind.display_name()
    )
}

/// Chat notice for a failed provider request.
pub fn error_notice(error: &impl std::fmt::Display) -> String {
    format!("**Error:** {error}. Check Settings.")
}
