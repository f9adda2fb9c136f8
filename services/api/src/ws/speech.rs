//! Speech adapters backed by the browser on the other end of the socket.
//!
//! Synthesis and recognition stay in the browser. `speak` sends a `speak`
//! message and parks until the browser reports `speech_ended` or
//! `speech_error` for the same utterance id.

use super::protocol::{Capabilities, ServerMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use tutor_core::error::TutorError;
use tutor_core::speech::{SpeechInput, SpeechOutcome, SpeechOutput, Utterance, UtteranceId, Voice};

pub struct BrowserSpeech {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    capabilities: Capabilities,
    voices: RwLock<Vec<Voice>>,
    pending: Mutex<HashMap<UtteranceId, oneshot::Sender<SpeechOutcome>>>,
}

impl BrowserSpeech {
    pub fn new(
        outbound: mpsc::UnboundedSender<ServerMessage>,
        capabilities: Capabilities,
        voices: Vec<Voice>,
    ) -> Self {
        Self {
            outbound,
            capabilities,
            voices: RwLock::new(voices),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the voice list; voices often load after the page does.
    pub fn set_voices(&self, voices: Vec<Voice>) {
        debug!(count = voices.len(), "Browser voices updated");
        if let Ok(mut current) = self.voices.write() {
            *current = voices;
        }
    }

    /// Delivers the browser's report for `utterance`. Reports for utterances
    /// nobody waits on any more are dropped.
    pub fn resolve(&self, utterance: UtteranceId, outcome: SpeechOutcome) {
        let waiter = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&utterance));
        match waiter {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!(%utterance, "Speech report for an utterance no longer awaited"),
        }
    }

    fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

#[async_trait]
impl SpeechOutput for BrowserSpeech {
    fn voices(&self) -> Vec<Voice> {
        self.voices.read().map(|v| v.clone()).unwrap_or_default()
    }

    async fn speak(&self, utterance: Utterance) -> SpeechOutcome {
        if !self.capabilities.speech_synthesis {
            return SpeechOutcome::Failed("speech synthesis unavailable".to_string());
        }

        let id = utterance.id;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        if !self.send(ServerMessage::from(utterance)) {
            warn!(utterance = %id, "Client gone before speech could start");
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            return SpeechOutcome::Interrupted;
        }

        rx.await.unwrap_or(SpeechOutcome::Interrupted)
    }

    async fn cancel(&self) {
        // Dropping the waiters resolves them as interrupted.
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        self.send(ServerMessage::CancelSpeech);
    }
}

#[async_trait]
impl SpeechInput for BrowserSpeech {
    fn is_available(&self) -> bool {
        self.capabilities.speech_recognition
    }

    async fn start(&self, lang: &str) -> Result<(), TutorError> {
        if !self.is_available() {
            return Err(TutorError::SpeechInputUnavailable);
        }
        self.send(ServerMessage::StartListening {
            lang: lang.to_string(),
        });
        Ok(())
    }

    async fn stop(&self) {
        self.send(ServerMessage::StopListening);
    }
}
