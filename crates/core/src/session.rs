//! Tutor Session
//!
//! The runtime around a [`LectureEngine`]. It owns the chat history, the
//! composer and the adapters, and executes the engine's [`Command`]s.
//!
//! Everything that happens to a session arrives as a [`SessionEvent`] on a
//! single channel: student actions from the front-end as well as callbacks
//! from speech, timers and provider requests. Events are handled one at a
//! time, so the engine never sees two transitions race each other. Each
//! background task sits in a slot; filling a slot aborts whatever was in it.

use crate::config::ConfigStore;
use crate::engine::{DoubtContext, LectureEngine, TutorState};
use crate::error::ProviderError;
use crate::image::ImageAttachment;
use crate::lecture::BoardSegment;
use crate::message::{HISTORY_WINDOW, History, Message};
use crate::prompts::{
    DEFAULT_IMAGE_PROMPT, DEFAULT_SYSTEM_PROMPT, coming_soon_notice, doubt_prompt, error_notice,
};
use crate::provider::{GenerateRequest, ProviderRegistry};
use crate::speech::{
    RECOGNITION_LANG, SpeechInput, SpeechOutcome, SpeechOutput, UtteranceId, VoiceProfile,
    prepare_utterance,
};
use crate::{AdvanceToken, Command};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause between the end of one chunk and the start of the next.
pub const DEFAULT_PACING: Duration = Duration::from_millis(800);

/// Identifies one provider request so a superseded response can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub u64);

/// Input to a session.
#[derive(Debug)]
pub enum SessionEvent {
    SetDraft(String),
    /// A `data:` URL read from an image file.
    AttachImage(String),
    RemoveImage,
    Submit,
    Interrupt,
    Resume,
    ToggleListening,
    SpeechFinished { utterance: UtteranceId },
    AdvanceDue { token: AdvanceToken },
    Transcript(String),
    ListeningEnded,
    ListeningFailed(String),
    ResponseReady {
        request: RequestId,
        result: Result<String, ProviderError>,
    },
    Shutdown,
}

/// Output of a session, for whatever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged {
        state: TutorState,
        /// `(cursor, total)` of the current lecture.
        progress: Option<(usize, usize)>,
    },
    WhiteboardChanged {
        content: String,
        segments: Vec<BoardSegment>,
    },
    MessageAppended(Message),
    ComposerChanged { draft: String, has_image: bool },
    /// Transient feedback that is not part of the chat, e.g. a rejected image.
    Notice(String),
}

/// Everything needed to render a session from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: TutorState,
    pub progress: Option<(usize, usize)>,
    pub whiteboard: String,
    pub segments: Vec<BoardSegment>,
    pub messages: Vec<Message>,
    pub draft: String,
    pub has_image: bool,
    pub user_name: String,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub pacing: Duration,
    pub history_window: usize,
    pub voice: VoiceProfile,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pacing: DEFAULT_PACING,
            history_window: HISTORY_WINDOW,
            voice: VoiceProfile::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Composer {
    draft: String,
    image: Option<ImageAttachment>,
}

impl Composer {
    /// Appends a recognised transcript, space-separated.
    fn append_transcript(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.draft.trim().is_empty() {
            self.draft = text.to_string();
        } else {
            self.draft = format!("{} {}", self.draft.trim_end(), text);
        }
    }
}

#[derive(Debug, Default)]
struct TaskSlot(Option<JoinHandle<()>>);

impl TaskSlot {
    fn fill(&mut self, handle: JoinHandle<()>) {
        self.clear();
        self.0 = Some(handle);
    }

    /// Aborts the task. Returns whether it was still running.
    fn clear(&mut self) -> bool {
        match self.0.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    id: RequestId,
    doubt: Option<DoubtContext>,
}

/// Receiving ends handed out by [`TutorSession::new`].
pub struct SessionChannels {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub updates: mpsc::UnboundedReceiver<SessionUpdate>,
}

pub struct TutorSession {
    engine: LectureEngine,
    history: History,
    composer: Composer,
    settings: Arc<ConfigStore>,
    providers: ProviderRegistry,
    speech_out: Arc<dyn SpeechOutput>,
    speech_in: Arc<dyn SpeechInput>,
    options: SessionOptions,
    events: mpsc::UnboundedSender<SessionEvent>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    utterance_task: TaskSlot,
    advance_task: TaskSlot,
    request_task: TaskSlot,
    pending: Option<PendingRequest>,
    next_request: u64,
    published: (TutorState, Option<(usize, usize)>, String),
}

impl TutorSession {
    pub fn new(
        settings: Arc<ConfigStore>,
        providers: ProviderRegistry,
        speech_out: Arc<dyn SpeechOutput>,
        speech_in: Arc<dyn SpeechInput>,
        options: SessionOptions,
    ) -> (Self, SessionChannels) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let session = Self {
            engine: LectureEngine::new(),
            history: History::default(),
            composer: Composer::default(),
            settings,
            providers,
            speech_out,
            speech_in,
            options,
            events: events_tx,
            updates: updates_tx,
            utterance_task: TaskSlot::default(),
            advance_task: TaskSlot::default(),
            request_task: TaskSlot::default(),
            pending: None,
            next_request: 0,
            published: (TutorState::Idle, None, String::new()),
        };
        (
            session,
            SessionChannels {
                events: events_rx,
                updates: updates_rx,
            },
        )
    }

    /// A sender for feeding events into this session.
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> TutorState {
        self.engine.state()
    }

    pub fn engine(&self) -> &LectureEngine {
        &self.engine
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn draft(&self) -> &str {
        &self.composer.draft
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let whiteboard = self.engine.whiteboard();
        SessionSnapshot {
            state: self.engine.state(),
            progress: self.engine.progress(),
            whiteboard: whiteboard.content().to_string(),
            segments: whiteboard.segments(),
            messages: self.history.messages().to_vec(),
            draft: self.composer.draft.clone(),
            has_image: self.composer.image.is_some(),
            user_name: self.settings.current().user_name,
        }
    }

    /// Handles events until [`SessionEvent::Shutdown`] arrives or every
    /// sender is gone. Background tasks die with the session.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        info!("Tutor session started");
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle(event).await;
        }
        self.execute(vec![Command::CancelSpeech, Command::CancelAdvance])
            .await;
        if self.engine.state() == TutorState::Listening {
            self.speech_in.stop().await;
        }
        info!("Tutor session closed");
    }

    pub async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SetDraft(draft) => {
                self.composer.draft = draft;
            }
            SessionEvent::AttachImage(data_url) => match ImageAttachment::from_data_url(&data_url) {
                Ok(image) => {
                    debug!(mime = %image.mime_type(), "Image attached");
                    self.composer.image = Some(image);
                    self.publish_composer();
                }
                Err(e) => {
                    warn!(error = %e, "Rejected image attachment");
                    self.notify(e.to_string());
                }
            },
            SessionEvent::RemoveImage => {
                self.composer.image = None;
                self.publish_composer();
            }
            SessionEvent::Submit => self.submit().await,
            SessionEvent::Interrupt => {
                let commands = self.engine.interrupt();
                self.execute(commands).await;
            }
            SessionEvent::Resume => {
                let commands = self.engine.resume();
                self.execute(commands).await;
            }
            SessionEvent::ToggleListening => {
                match self.engine.toggle_listening(self.speech_in.is_available()) {
                    Ok(commands) => self.execute(commands).await,
                    Err(e) => self.notify(e.to_string()),
                }
            }
            SessionEvent::SpeechFinished { utterance } => {
                let commands = self.engine.on_speech_finished(utterance);
                self.execute(commands).await;
            }
            SessionEvent::AdvanceDue { token } => {
                let commands = self.engine.on_advance_due(token);
                self.execute(commands).await;
            }
            SessionEvent::Transcript(text) => {
                debug!(transcript = %text, "Speech recognised");
                self.composer.append_transcript(&text);
                self.publish_composer();
                self.engine.on_listening_finished();
            }
            SessionEvent::ListeningEnded => self.engine.on_listening_finished(),
            SessionEvent::ListeningFailed(reason) => {
                warn!(%reason, "Speech recognition failed");
                self.engine.on_listening_finished();
            }
            SessionEvent::ResponseReady { request, result } => {
                self.on_response(request, result).await;
            }
            SessionEvent::Shutdown => {}
        }
        self.publish_changes();
    }

    async fn submit(&mut self) {
        let text = self.composer.draft.trim().to_string();
        if text.is_empty() && self.composer.image.is_none() {
            return;
        }
        if self.engine.state() == TutorState::Preparing {
            debug!("Ignoring submission while a response is being prepared");
            return;
        }

        let config = self.settings.current();
        let Some(provider) = self.providers.get(config.provider) else {
            info!(provider = %config.provider, "Selected provider is not available yet");
            self.push_message(Message::system(coming_soon_notice(config.provider)));
            self.composer.draft.clear();
            self.publish_composer();
            return;
        };

        let doubt = if self.engine.accepts_doubt() {
            let (commands, context) = self.engine.begin_doubt();
            self.execute(commands).await;
            Some(context)
        } else {
            let commands = self.engine.begin_topic();
            self.execute(commands).await;
            None
        };

        let history = self.history.context_window(self.options.history_window);
        self.push_message(Message::user(text.clone()));
        let image = self.composer.image.take();
        self.composer.draft.clear();
        self.publish_composer();

        let prompt = if text.is_empty() {
            DEFAULT_IMAGE_PROMPT.to_string()
        } else {
            text
        };
        let prompt = match doubt {
            Some(context) => doubt_prompt(context, &prompt),
            None => prompt,
        };
        let request = GenerateRequest {
            system_prompt: self.options.system_prompt.clone(),
            prompt,
            image,
            history,
        };

        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.pending = Some(PendingRequest { id, doubt });
        info!(provider = %config.provider, request = id.0, doubt = doubt.is_some(), has_image = request.image.is_some(), "Requesting response");

        let api_key = config.key_for(config.provider).unwrap_or_default().to_string();
        let events = self.events.clone();
        self.request_task.fill(tokio::spawn(async move {
            let result = provider.generate(&api_key, &request).await;
            let _ = events.send(SessionEvent::ResponseReady {
                request: id,
                result,
            });
        }));
    }

    async fn on_response(&mut self, request: RequestId, result: Result<String, ProviderError>) {
        let pending = match self.pending {
            Some(pending) if pending.id == request => pending,
            _ => {
                debug!(request = request.0, "Ignoring superseded response");
                return;
            }
        };
        self.pending = None;

        match result {
            Ok(text) => {
                self.push_message(Message::assistant(text.clone()));
                let commands = match pending.doubt {
                    Some(_) => self.engine.deliver_doubt_answer(&text),
                    None => self.engine.start_lecture(&text),
                };
                self.execute(commands).await;
            }
            Err(e) => {
                error!(error = %e, "Response request failed");
                self.push_message(Message::system(error_notice(&e)));
                let commands = self.engine.abandon();
                self.execute(commands).await;
            }
        }
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Speak { utterance, text } => self.speak(utterance, &text).await,
                Command::CancelSpeech => self.cancel_speech().await,
                Command::ScheduleAdvance { token } => {
                    let events = self.events.clone();
                    let pacing = self.options.pacing;
                    self.advance_task.fill(tokio::spawn(async move {
                        tokio::time::sleep(pacing).await;
                        let _ = events.send(SessionEvent::AdvanceDue { token });
                    }));
                }
                Command::CancelAdvance => {
                    self.advance_task.clear();
                }
                Command::StartListening => {
                    if let Err(e) = self.speech_in.start(RECOGNITION_LANG).await {
                        warn!(error = %e, "Could not start speech recognition");
                        self.notify(e.to_string());
                        self.engine.on_listening_finished();
                    }
                }
                Command::StopListening => self.speech_in.stop().await,
            }
        }
    }

    async fn cancel_speech(&mut self) {
        if self.utterance_task.clear() {
            self.speech_out.cancel().await;
        }
    }

    async fn speak(&mut self, utterance: UtteranceId, text: &str) {
        self.cancel_speech().await;

        let voices = self.speech_out.voices();
        let Some(prepared) = prepare_utterance(utterance, text, &self.options.voice, &voices) else {
            // Nothing speakable, e.g. a diagram-only chunk.
            debug!(%utterance, "Skipping silent utterance");
            let _ = self.events.send(SessionEvent::SpeechFinished { utterance });
            return;
        };

        let speech = Arc::clone(&self.speech_out);
        let events = self.events.clone();
        self.utterance_task.fill(tokio::spawn(async move {
            match speech.speak(prepared).await {
                SpeechOutcome::Completed => {}
                SpeechOutcome::Interrupted => {
                    debug!(%utterance, "Utterance interrupted");
                    return;
                }
                SpeechOutcome::Failed(reason) => {
                    warn!(%utterance, %reason, "Speech synthesis failed, continuing");
                }
            }
            let _ = events.send(SessionEvent::SpeechFinished { utterance });
        }));
    }

    fn push_message(&mut self, message: Message) {
        let message = self.history.push(message).clone();
        self.publish(SessionUpdate::MessageAppended(message));
    }

    fn notify(&self, text: String) {
        self.publish(SessionUpdate::Notice(text));
    }

    fn publish_composer(&self) {
        self.publish(SessionUpdate::ComposerChanged {
            draft: self.composer.draft.clone(),
            has_image: self.composer.image.is_some(),
        });
    }

    /// Emits state and whiteboard updates for whatever changed since the
    /// last call.
    fn publish_changes(&mut self) {
        let state = self.engine.state();
        let progress = self.engine.progress();
        if (state, progress) != (self.published.0, self.published.1) {
            self.published.0 = state;
            self.published.1 = progress;
            self.publish(SessionUpdate::StateChanged { state, progress });
        }

        let whiteboard = self.engine.whiteboard();
        if whiteboard.content() != self.published.2 {
            self.published.2 = whiteboard.content().to_string();
            self.publish(SessionUpdate::WhiteboardChanged {
                content: self.published.2.clone(),
                segments: whiteboard.segments(),
            });
        }
    }

    fn publish(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            debug!("Session update dropped, no observer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ProviderKind};
    use crate::message::MessageRole;
    use crate::provider::MockResponseProvider;
    use crate::testing::{FakeSpeechInput, FakeSpeechOutput};
    use std::sync::Mutex;
    use tokio::time::timeout;

    const PLAN: &str = "Step one. ||| Step two. ||| Step three.";

    struct Harness {
        session: TutorSession,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        updates: mpsc::UnboundedReceiver<SessionUpdate>,
        speech: Arc<FakeSpeechOutput>,
        mic: Arc<FakeSpeechInput>,
    }

    impl Harness {
        fn new(provider: MockResponseProvider, speech: FakeSpeechOutput) -> Self {
            Self::build(provider, speech, FakeSpeechInput::default(), AppConfig {
                gemini_key: "test-key".to_string(),
                ..AppConfig::default()
            })
        }

        fn build(
            provider: MockResponseProvider,
            speech: FakeSpeechOutput,
            mic: FakeSpeechInput,
            config: AppConfig,
        ) -> Self {
            let speech = Arc::new(speech);
            let mic = Arc::new(mic);
            let providers = ProviderRegistry::new().with(ProviderKind::Gemini, Arc::new(provider));
            let (session, channels) = TutorSession::new(
                Arc::new(ConfigStore::in_memory(config)),
                providers,
                speech.clone(),
                mic.clone(),
                SessionOptions::default(),
            );
            Self {
                session,
                events: channels.events,
                updates: channels.updates,
                speech,
                mic,
            }
        }

        async fn send(&mut self, event: SessionEvent) {
            self.session.handle(event).await;
        }

        /// Resumes and lets the re-spoken chunk's task start.
        async fn resume(&mut self) {
            self.send(SessionEvent::Resume).await;
            tokio::task::yield_now().await;
        }

        async fn submit(&mut self, text: &str) {
            self.send(SessionEvent::SetDraft(text.to_string())).await;
            self.send(SessionEvent::Submit).await;
        }

        /// Handles one queued callback, without letting the pacing delay run.
        async fn step(&mut self) -> bool {
            match timeout(Duration::from_millis(10), self.events.recv()).await {
                Ok(Some(event)) => {
                    self.session.handle(event).await;
                    true
                }
                _ => false,
            }
        }

        /// Handles callbacks, timers included, until the session goes quiet.
        async fn settle(&mut self) {
            while let Ok(Some(event)) = timeout(Duration::from_secs(5), self.events.recv()).await {
                self.session.handle(event).await;
            }
        }

        fn updates(&mut self) -> Vec<SessionUpdate> {
            let mut out = Vec::new();
            while let Ok(update) = self.updates.try_recv() {
                out.push(update);
            }
            out
        }

        fn system_messages(&self) -> Vec<String> {
            self.session
                .history()
                .messages()
                .iter()
                .filter(|m| m.role == MessageRole::System)
                .map(|m| m.content.clone())
                .collect()
        }
    }

    fn plan_provider(plan: &'static str) -> MockResponseProvider {
        let mut provider = MockResponseProvider::new();
        provider
            .expect_generate()
            .returning(move |_, _| Ok(plan.to_string()));
        provider
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_plays_every_chunk_then_idles() {
        let mut h = Harness::new(plan_provider(PLAN), FakeSpeechOutput::instant());

        h.submit("Explain sin theta").await;
        assert_eq!(h.session.state(), TutorState::Preparing);
        assert_eq!(h.session.draft(), "");

        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Idle);
        assert_eq!(
            h.speech.spoken_texts(),
            vec!["Step one.", "Step two.", "Step three."]
        );
        assert_eq!(
            h.session.engine().whiteboard().content(),
            "Step one.\n\nStep two.\n\nStep three."
        );

        let messages = h.session.history().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].display_text(), "explaining on whiteboard...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_doubt_mid_lecture_carries_position_and_pauses_after() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = prompts.clone();
        let mut provider = MockResponseProvider::new();
        provider.expect_generate().returning(move |_, request| {
            seen.lock().unwrap().push(request.prompt.clone());
            if request.prompt.contains("STUDENT DOUBT") {
                Ok("Theta ek angle hai. Continue karein?".to_string())
            } else {
                Ok("a ||| b ||| c ||| d ||| e".to_string())
            }
        });
        let mut h = Harness::new(provider, FakeSpeechOutput::manual());

        h.submit("Trigonometry basics").await;
        h.settle().await;
        assert_eq!(h.speech.spoken_texts(), vec!["a"]);

        for _ in 0..2 {
            assert!(h.speech.finish_current(SpeechOutcome::Completed));
            h.settle().await;
        }
        assert_eq!(h.session.engine().cursor(), Some(2));
        assert_eq!(h.session.state(), TutorState::Teaching);

        h.submit("What is theta?").await;
        assert_eq!(h.session.state(), TutorState::AnsweringDoubt);

        h.settle().await;
        let doubt_prompt = prompts.lock().unwrap()[1].clone();
        assert!(doubt_prompt.contains("3/5"));
        assert!(doubt_prompt.contains("What is theta?"));
        assert!(
            h.session
                .engine()
                .whiteboard()
                .content()
                .contains("> **Doubt Solved:** Theta ek angle hai.")
        );

        assert!(h.speech.finish_current(SpeechOutcome::Completed));
        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Paused);
        assert_eq!(h.session.engine().cursor(), Some(2));

        h.resume().await;
        assert_eq!(h.session.state(), TutorState::Teaching);
        assert_eq!(h.speech.last_spoken().unwrap().text, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_posts_error_and_idles() {
        let mut provider = MockResponseProvider::new();
        provider.expect_generate().returning(|_, _| {
            Err(ProviderError::Api {
                status: Some(400),
                message: "Invalid key".to_string(),
            })
        });
        let mut h = Harness::new(provider, FakeSpeechOutput::instant());

        h.submit("Explain vectors").await;
        h.settle().await;

        assert_eq!(h.session.state(), TutorState::Idle);
        assert_eq!(
            h.system_messages(),
            vec!["**Error:** Invalid key. Check Settings.".to_string()]
        );
        assert!(h.speech.spoken_texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_is_reported_in_chat() {
        let mut provider = MockResponseProvider::new();
        provider
            .expect_generate()
            .withf(|api_key, _| api_key.is_empty())
            .returning(|_, _| Err(ProviderError::MissingKey { provider: "Gemini" }));
        let mut h = Harness::build(
            provider,
            FakeSpeechOutput::instant(),
            FakeSpeechInput::default(),
            AppConfig::default(),
        );

        h.submit("Explain vectors").await;
        h.settle().await;
        assert_eq!(
            h.system_messages(),
            vec!["**Error:** Gemini API Key is required. Check Settings.".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_pacing_delay_holds_cursor() {
        let mut h = Harness::new(plan_provider(PLAN), FakeSpeechOutput::manual());
        h.submit("Explain sin theta").await;
        h.settle().await;

        assert!(h.speech.finish_current(SpeechOutcome::Completed));
        assert!(h.step().await);
        assert!(h.session.engine().has_pending_advance());

        h.send(SessionEvent::Interrupt).await;
        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Paused);
        assert_eq!(h.session.engine().cursor(), Some(0));
        assert_eq!(h.speech.spoken_texts(), vec!["Step one."]);

        h.resume().await;
        assert_eq!(h.session.state(), TutorState::Teaching);
        assert_eq!(h.speech.spoken_texts(), vec!["Step one.", "Step one."]);
        assert_eq!(h.session.engine().whiteboard().content(), "Step one.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_active_speech() {
        let mut h = Harness::new(plan_provider(PLAN), FakeSpeechOutput::manual());
        h.submit("Explain sin theta").await;
        h.settle().await;

        h.send(SessionEvent::Interrupt).await;
        assert_eq!(h.speech.cancel_count(), 1);
        assert!(!h.speech.finish_current(SpeechOutcome::Completed));
        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_provider_is_coming_soon() {
        let mut h = Harness::build(
            MockResponseProvider::new(),
            FakeSpeechOutput::instant(),
            FakeSpeechInput::default(),
            AppConfig {
                provider: ProviderKind::OpenAi,
                ..AppConfig::default()
            },
        );

        h.submit("Explain vectors").await;
        h.settle().await;

        assert_eq!(h.session.state(), TutorState::Idle);
        assert_eq!(h.session.draft(), "");
        let notices = h.system_messages();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("support for ChatGPT is under active development"));
        assert_eq!(h.session.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_preparing_submissions_are_ignored() {
        let mut provider = MockResponseProvider::new();
        provider
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("Only step.".to_string()));
        let mut h = Harness::new(provider, FakeSpeechOutput::instant());

        h.submit("   ").await;
        assert_eq!(h.session.state(), TutorState::Idle);
        assert!(h.session.history().is_empty());

        h.submit("First topic").await;
        h.submit("Second topic").await;
        assert_eq!(h.session.draft(), "Second topic");
        assert_eq!(h.session.history().len(), 1);

        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_only_submission_uses_default_prompt() {
        let mut provider = MockResponseProvider::new();
        provider
            .expect_generate()
            .withf(|_, request| request.prompt == "Explain this image" && request.image.is_some())
            .times(1)
            .returning(|_, _| Ok("Yeh ek triangle hai.".to_string()));
        let mut h = Harness::new(provider, FakeSpeechOutput::instant());

        h.send(SessionEvent::AttachImage("data:image/png;base64,iVBORw0KGgo=".to_string()))
            .await;
        h.send(SessionEvent::Submit).await;
        h.settle().await;

        assert!(!h.session.snapshot().has_image);
        assert_eq!(h.session.state(), TutorState::Idle);
        assert_eq!(h.speech.spoken_texts(), vec!["Yeh ek triangle hai."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_window_excludes_new_message_and_notices() {
        let requests = Arc::new(Mutex::new(Vec::<GenerateRequest>::new()));
        let seen = requests.clone();
        let mut provider = MockResponseProvider::new();
        provider.expect_generate().times(2).returning(move |_, request| {
            seen.lock().unwrap().push(request.clone());
            Ok("One ||| Two".to_string())
        });
        let mut h = Harness::new(provider, FakeSpeechOutput::instant());

        h.submit("First").await;
        h.settle().await;
        h.send(SessionEvent::AttachImage("not an image".to_string())).await;
        h.submit("Second").await;
        h.settle().await;

        let requests = requests.lock().unwrap();
        assert!(requests[0].history.is_empty());
        let history: Vec<&str> = requests[1].history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(history, vec!["First", "One ||| Two"]);
        assert_eq!(requests[1].prompt, "Second");
        assert_eq!(h.session.history().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_and_failed_speech_still_advance() {
        let plan = "<svg><circle r=\"4\"/></svg> ||| Step two.";
        let mut h = Harness::new(plan_provider(plan), FakeSpeechOutput::manual());
        h.submit("Draw a circle").await;
        h.settle().await;

        // The diagram-only chunk is never spoken.
        assert_eq!(h.speech.spoken_texts(), vec!["Step two."]);
        assert!(h.speech.finish_current(SpeechOutcome::Failed("synthesis-failed".to_string())));
        h.settle().await;
        assert_eq!(h.session.state(), TutorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_topic_replaces_finished_lecture() {
        let mut provider = MockResponseProvider::new();
        provider.expect_generate().returning(|_, request| {
            if request.prompt == "Old topic" {
                Ok("old one ||| old two".to_string())
            } else {
                Ok("new one ||| new two ||| new three".to_string())
            }
        });
        let mut h = Harness::new(provider, FakeSpeechOutput::manual());
        h.submit("Old topic").await;
        h.settle().await;
        for _ in 0..2 {
            assert!(h.speech.finish_current(SpeechOutcome::Completed));
            h.settle().await;
        }
        assert_eq!(h.session.state(), TutorState::Idle);

        h.submit("New topic").await;
        assert_eq!(h.session.engine().lecture().map(|l| l.len()), None);
        h.settle().await;

        assert_eq!(h.session.state(), TutorState::Teaching);
        assert_eq!(h.session.engine().whiteboard().content(), "new one");
        assert_eq!(h.session.engine().progress(), Some((0, 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_is_ignored() {
        let mut h = Harness::new(plan_provider(PLAN), FakeSpeechOutput::manual());
        h.submit("Explain sin theta").await;
        h.settle().await;
        h.send(SessionEvent::Interrupt).await;

        h.send(SessionEvent::ResponseReady {
            request: RequestId(99),
            result: Ok("stale ||| plan".to_string()),
        })
        .await;
        assert_eq!(h.session.state(), TutorState::Paused);
        assert_eq!(h.session.history().len(), 2);
        assert_eq!(h.session.engine().progress(), Some((0, 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_input_appends_transcript() {
        let mut h = Harness::new(MockResponseProvider::new(), FakeSpeechOutput::instant());
        h.send(SessionEvent::SetDraft("Explain".to_string())).await;

        h.send(SessionEvent::ToggleListening).await;
        assert_eq!(h.session.state(), TutorState::Listening);
        assert_eq!(h.mic.starts(), 1);

        h.send(SessionEvent::Transcript("sine theta".to_string())).await;
        assert_eq!(h.session.draft(), "Explain sine theta");
        assert_eq!(h.session.state(), TutorState::Idle);

        h.send(SessionEvent::ListeningEnded).await;
        assert_eq!(h.session.state(), TutorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_input_unavailable_is_a_notice() {
        let mut h = Harness::build(
            MockResponseProvider::new(),
            FakeSpeechOutput::instant(),
            FakeSpeechInput::unavailable(),
            AppConfig::default(),
        );
        h.send(SessionEvent::ToggleListening).await;

        assert_eq!(h.session.state(), TutorState::Idle);
        assert!(h.updates().contains(&SessionUpdate::Notice(
            "Voice input not supported in this browser.".to_string()
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_follow_state_and_whiteboard() {
        let mut h = Harness::new(plan_provider("Only step."), FakeSpeechOutput::instant());
        h.submit("Explain").await;
        h.settle().await;

        let updates = h.updates();
        let states: Vec<TutorState> = updates
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![TutorState::Preparing, TutorState::Teaching, TutorState::Idle]
        );
        assert!(updates.iter().any(|u| matches!(
            u,
            SessionUpdate::WhiteboardChanged { content, .. } if content == "Only step."
        )));
        assert_eq!(
            updates
                .iter()
                .filter(|u| matches!(u, SessionUpdate::MessageAppended(_)))
                .count(),
            2
        );
        assert_eq!(h.mic.stops(), 0);
    }
}
