//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::engine::TutorState;
use tutor_core::lecture::BoardSegment;
use tutor_core::message::{Message, MessageRole};
use tutor_core::session::{SessionSnapshot, SessionUpdate};
use tutor_core::speech::{Utterance, UtteranceId, Voice};

/// What the browser can do natively.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Capabilities {
    pub speech_synthesis: bool,
    pub speech_recognition: bool,
}

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts the lecture session. This must be the first message.
    Init {
        #[serde(default)]
        capabilities: Capabilities,
        #[serde(default)]
        voices: Vec<Voice>,
    },
    /// The browser finished loading (or reloaded) its voice list.
    VoicesChanged { voices: Vec<Voice> },
    SetDraft { text: String },
    AttachImage { data_url: String },
    RemoveImage,
    Submit,
    Interrupt,
    Resume,
    ToggleListening,
    SpeechEnded { utterance_id: UtteranceId },
    SpeechError { utterance_id: UtteranceId, error: String },
    Transcript { text: String },
    ListeningEnded,
    ListeningError { error: String },
}

/// A chat message as the chat panel renders it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    /// Raw text, separators included.
    pub content: String,
    pub display_text: String,
    pub label: Option<&'static str>,
    pub timestamp: i64,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            display_text: message.display_text().to_string(),
            label: message.label(),
            timestamp: message.timestamp,
        }
    }
}

/// Everything the browser needs to render a session from scratch.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: TutorState,
    pub step: Option<usize>,
    pub total: Option<usize>,
    pub whiteboard: String,
    pub segments: Vec<BoardSegment>,
    pub messages: Vec<ChatMessage>,
    pub draft: String,
    pub has_image: bool,
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// One-based step shown to the student, clamped once the lecture has ended.
fn step_and_total(progress: Option<(usize, usize)>) -> (Option<usize>, Option<usize>) {
    match progress {
        Some((cursor, total)) => (Some((cursor + 1).min(total)), Some(total)),
        None => (None, None),
    }
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        let (step, total) = step_and_total(snapshot.progress);
        Self {
            state: snapshot.state,
            step,
            total,
            whiteboard: snapshot.whiteboard,
            segments: snapshot.segments,
            messages: snapshot.messages.iter().map(ChatMessage::from).collect(),
            draft: snapshot.draft,
            has_image: snapshot.has_image,
            user_name: snapshot.user_name,
        }
    }
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms session initialization and provides the initial view.
    Initialized { snapshot: SessionView },
    StateUpdate {
        state: TutorState,
        step: Option<usize>,
        total: Option<usize>,
    },
    Whiteboard {
        content: String,
        segments: Vec<BoardSegment>,
    },
    Message { message: ChatMessage },
    Composer { draft: String, has_image: bool },
    /// Speak the text and answer with `speech_ended` or `speech_error`.
    Speak {
        utterance_id: UtteranceId,
        text: String,
        voice: Option<String>,
        lang: String,
        rate: f32,
        pitch: f32,
    },
    CancelSpeech,
    StartListening { lang: String },
    StopListening,
    /// Transient feedback, e.g. an alert.
    Notice { message: String },
    /// Reports a protocol error to the client.
    Error { message: String },
}

impl From<Utterance> for ServerMessage {
    fn from(utterance: Utterance) -> Self {
        ServerMessage::Speak {
            utterance_id: utterance.id,
            text: utterance.text,
            voice: utterance.voice,
            lang: utterance.lang,
            rate: utterance.rate,
            pitch: utterance.pitch,
        }
    }
}

impl From<SessionUpdate> for ServerMessage {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::StateChanged { state, progress } => {
                let (step, total) = step_and_total(progress);
                ServerMessage::StateUpdate { state, step, total }
            }
            SessionUpdate::WhiteboardChanged { content, segments } => {
                ServerMessage::Whiteboard { content, segments }
            }
            SessionUpdate::MessageAppended(message) => ServerMessage::Message {
                message: ChatMessage::from(&message),
            },
            SessionUpdate::ComposerChanged { draft, has_image } => {
                ServerMessage::Composer { draft, has_image }
            }
            SessionUpdate::Notice(message) => ServerMessage::Notice { message },
        }
    }
}
