//! Terminal stand-ins for the speech adapters: "speaking" prints the text and
//! takes as long as reading it aloud would.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use tutor_core::error::TutorError;
use tutor_core::speech::{SpeechInput, SpeechOutcome, SpeechOutput, Utterance, Voice};

const MIN_SPEAKING_TIME: Duration = Duration::from_millis(300);

/// How long reading `text` aloud takes at `words_per_minute`.
pub fn speaking_duration(text: &str, words_per_minute: u64) -> Duration {
    let words = text.split_whitespace().count() as u64;
    let millis = words * 60_000 / words_per_minute.max(1);
    Duration::from_millis(millis).max(MIN_SPEAKING_TIME)
}

pub struct ConsoleSpeech {
    words_per_minute: u64,
}

impl ConsoleSpeech {
    pub fn new(words_per_minute: u64) -> Self {
        Self { words_per_minute }
    }
}

#[async_trait]
impl SpeechOutput for ConsoleSpeech {
    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    async fn speak(&self, utterance: Utterance) -> SpeechOutcome {
        println!("🗣  {}", utterance.text);
        tokio::time::sleep(speaking_duration(&utterance.text, self.words_per_minute)).await;
        SpeechOutcome::Completed
    }

    async fn cancel(&self) {
        debug!("Speech cancelled");
    }
}

/// A terminal has no microphone pipeline; voice input is always unavailable.
pub struct NoSpeechInput;

#[async_trait]
impl SpeechInput for NoSpeechInput {
    fn is_available(&self) -> bool {
        false
    }

    async fn start(&self, _lang: &str) -> Result<(), TutorError> {
        Err(TutorError::SpeechInputUnavailable)
    }

    async fn stop(&self) {}
}
