//! Loading of prompt overrides from the `PROMPTS_PATH` directory.

use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;
use tutor_core::prompts::DEFAULT_SYSTEM_PROMPT;

/// Reads every `*.md` file in `prompts_path`, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// The tutor system prompt: `system_prompt.md` from `prompts_path` when the
/// directory is configured and has one, the built-in prompt otherwise.
pub fn load_system_prompt(prompts_path: Option<&Path>) -> anyhow::Result<String> {
    let Some(dir) = prompts_path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };
    match load_prompts(dir)?.remove("system_prompt") {
        Some(prompt) if !prompt.trim().is_empty() => {
            info!(path = %dir.display(), "Using system prompt override");
            Ok(prompt)
        }
        _ => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}
