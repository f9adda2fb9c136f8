pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod lecture;
pub mod message;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod speech;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, ConfigStore, ProviderKind};
pub use engine::{DoubtContext, LectureEngine, TutorState};
pub use error::{ProviderError, TutorError};
pub use session::{
    RequestId, SessionChannels, SessionEvent, SessionOptions, SessionSnapshot, SessionUpdate,
    TutorSession,
};

/// Identifies one scheduled step advance, so a timer that fires after the
/// advance was cancelled can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvanceToken(pub u64);

/// Represents commands that the lecture engine issues to the session runtime.
///
/// This enum is the primary API for decoupling the engine's decision-making
/// from the runtime's execution of side effects (speaking, timers and the
/// microphone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Speak the given text. Completion is reported back with `utterance`.
    Speak { utterance: speech::UtteranceId, text: String },
    /// Stop whatever is currently being spoken.
    CancelSpeech,
    /// Advance to the next chunk once the pacing delay has elapsed.
    ScheduleAdvance { token: AdvanceToken },
    /// Drop the pending advance, if any.
    CancelAdvance,
    StartListening,
    StopListening,
}
