//! Speech output and input adapters.
//!
//! The host environment (a browser, a terminal) does the actual synthesis and
//! recognition. The session only sees the two traits below; everything that
//! decides *what* is spoken and *how* lives here as plain functions.

use crate::error::TutorError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Language tag used for recognition of the student's voice.
pub const RECOGNITION_LANG: &str = "en-IN";

/// Identifies one utterance for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// A synthesis voice offered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

/// Text ready to be handed to a synthesiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// Name of the chosen voice; `None` lets the host pick one for `lang`.
    pub voice: Option<String>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// How an utterance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Playback reached the end.
    Completed,
    /// Playback was cut short by a cancel; not an error.
    Interrupted,
    /// Playback failed for any other reason.
    Failed(String),
}

impl SpeechOutcome {
    /// Classifies an error code reported by the host synthesiser.
    pub fn from_error_code(code: &str) -> Self {
        match code {
            "interrupted" | "canceled" => SpeechOutcome::Interrupted,
            other => SpeechOutcome::Failed(other.to_string()),
        }
    }
}

/// Platform text-to-speech.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Voices currently offered by the host. The list may grow after startup.
    fn voices(&self) -> Vec<Voice>;

    /// Speaks `utterance` and resolves when playback ends.
    async fn speak(&self, utterance: Utterance) -> SpeechOutcome;

    /// Stops whatever is being spoken.
    async fn cancel(&self);
}

/// Platform speech-to-text. Results are delivered to the session as events
/// by whoever owns the recognition session.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    fn is_available(&self) -> bool;

    async fn start(&self, lang: &str) -> Result<(), TutorError>;

    async fn stop(&self);
}

/// Voice selection and delivery parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Exact language tags accepted as a first choice.
    pub preferred_langs: Vec<String>,
    /// Substring looked for in voice names when no language matches.
    pub name_hint: String,
    /// Vendor name and region tried last, e.g. a Google voice for India.
    pub vendor_hint: String,
    pub region_hint: String,
    /// Tag used when no voice matches at all.
    pub fallback_lang: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            preferred_langs: vec!["hi-IN".to_string(), "hi".to_string()],
            name_hint: "Hindi".to_string(),
            vendor_hint: "Google".to_string(),
            region_hint: "IN".to_string(),
            fallback_lang: "hi-IN".to_string(),
            rate: 1.0,
            pitch: 1.05,
        }
    }
}

impl VoiceProfile {
    pub fn select<'a>(&self, voices: &'a [Voice]) -> Option<&'a Voice> {
        voices
            .iter()
            .find(|v| self.preferred_langs.iter().any(|l| *l == v.lang))
            .or_else(|| voices.iter().find(|v| v.name.contains(&self.name_hint)))
            .or_else(|| {
                voices.iter().find(|v| {
                    v.name.contains(&self.vendor_hint) && v.lang.contains(&self.region_hint)
                })
            })
    }
}

static MARKUP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*#_`|]").expect("valid markup pattern"));
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Removes markdown characters and tag-like substrings and collapses
/// whitespace, so formatting and diagrams are never read aloud.
pub fn clean_for_speech(text: &str) -> String {
    let text = MARKUP_CHARS.replace_all(text, "");
    let text = TAGS.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Builds the utterance for `text`, or `None` when nothing speakable remains.
pub fn prepare_utterance(
    id: UtteranceId,
    text: &str,
    profile: &VoiceProfile,
    voices: &[Voice],
) -> Option<Utterance> {
    let text = clean_for_speech(text);
    if text.is_empty() {
        return None;
    }
    let (voice, lang) = match profile.select(voices) {
        Some(v) => (Some(v.name.clone()), v.lang.clone()),
        None => (None, profile.fallback_lang.clone()),
    };
    Some(Utterance {
        id,
        text,
        voice,
        lang,
        rate: profile.rate,
        pitch: profile.pitch,
    })
}
