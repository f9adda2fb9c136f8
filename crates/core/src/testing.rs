//! Fake speech adapters for session tests.

use crate::error::TutorError;
use crate::speech::{SpeechInput, SpeechOutcome, SpeechOutput, Utterance, UtteranceId, Voice};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Records every utterance. In manual mode each utterance stays "playing"
/// until the test finishes it; otherwise it completes immediately.
#[derive(Default)]
pub struct FakeSpeechOutput {
    manual: bool,
    spoken: Mutex<Vec<Utterance>>,
    playing: Mutex<Vec<(UtteranceId, oneshot::Sender<SpeechOutcome>)>>,
    cancels: AtomicUsize,
}

impl FakeSpeechOutput {
    pub fn instant() -> Self {
        Self::default()
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|u| u.text.clone()).collect()
    }

    pub fn last_spoken(&self) -> Option<Utterance> {
        self.spoken.lock().unwrap().last().cloned()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Ends the most recent utterance that is still playing.
    pub fn finish_current(&self, outcome: SpeechOutcome) -> bool {
        let mut playing = self.playing.lock().unwrap();
        while let Some((_, tx)) = playing.pop() {
            if tx.send(outcome.clone()).is_ok() {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl SpeechOutput for FakeSpeechOutput {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            name: "Lekha".to_string(),
            lang: "hi-IN".to_string(),
        }]
    }

    async fn speak(&self, utterance: Utterance) -> SpeechOutcome {
        let id = utterance.id;
        self.spoken.lock().unwrap().push(utterance);
        if !self.manual {
            return SpeechOutcome::Completed;
        }
        let (tx, rx) = oneshot::channel();
        self.playing.lock().unwrap().push((id, tx));
        rx.await.unwrap_or(SpeechOutcome::Interrupted)
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.playing.lock().unwrap().clear();
    }
}

#[derive(Default)]
pub struct FakeSpeechInput {
    unavailable: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeSpeechInput {
    pub fn unavailable() -> Self {
        Self {
            unavailable: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechInput for FakeSpeechInput {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn start(&self, _lang: &str) -> Result<(), TutorError> {
        if !self.is_available() {
            return Err(TutorError::SpeechInputUnavailable);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
