//! Lecture Engine
//!
//! The state machine behind a live lecture. It owns the tutor state, the chunk
//! queue with its cursor and the whiteboard buffer. Every transition is a
//! synchronous method that returns the [`Command`]s the runtime must carry out;
//! the engine itself never touches audio, timers or the network.
//!
//! ```text
//! idle ──topic──▶ preparing ──response──▶ teaching ──last chunk──▶ idle
//!                                          │   ▲
//!                                interrupt │   │ resume
//!                                          ▼   │
//!                                         paused ──doubt──▶ answering_doubt
//! ```

use crate::{AdvanceToken, Command};
use crate::error::TutorError;
use crate::lecture::{Lecture, Whiteboard, build_queue};
use crate::speech::UtteranceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// What the tutor is doing right now. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorState {
    #[default]
    Idle,
    Preparing,
    Teaching,
    Listening,
    AnsweringDoubt,
    Paused,
}

impl fmt::Display for TutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TutorState::Idle => "idle",
            TutorState::Preparing => "preparing",
            TutorState::Teaching => "teaching",
            TutorState::Listening => "listening",
            TutorState::AnsweringDoubt => "answering_doubt",
            TutorState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Where the lecture stood when a doubt interrupted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubtContext {
    /// One-based step that was playing.
    pub step: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechPurpose {
    Chunk,
    DoubtAnswer,
}

#[derive(Debug, Default)]
pub struct LectureEngine {
    state: TutorState,
    lecture: Option<Lecture>,
    whiteboard: Whiteboard,
    speaking: Option<(UtteranceId, SpeechPurpose)>,
    pending_advance: Option<AdvanceToken>,
    next_utterance: u64,
    next_advance: u64,
}

impl LectureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TutorState {
        self.state
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.whiteboard
    }

    pub fn lecture(&self) -> Option<&Lecture> {
        self.lecture.as_ref()
    }

    /// The playback cursor, or `None` when no lecture exists.
    pub fn cursor(&self) -> Option<usize> {
        self.lecture.as_ref().map(Lecture::cursor)
    }

    /// `(cursor, total)` of the current lecture.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.lecture.as_ref().map(|l| (l.cursor(), l.len()))
    }

    /// Whether there is a lecture that still has chunks left to play.
    pub fn has_resumable_lecture(&self) -> bool {
        self.lecture.as_ref().is_some_and(|l| !l.is_finished())
    }

    pub fn has_pending_advance(&self) -> bool {
        self.pending_advance.is_some()
    }

    pub fn active_utterance(&self) -> Option<UtteranceId> {
        self.speaking.map(|(id, _)| id)
    }

    /// A submission made now would be a doubt about the running lecture.
    pub fn accepts_doubt(&self) -> bool {
        matches!(self.state, TutorState::Teaching | TutorState::Paused)
    }

    fn set_state(&mut self, next: TutorState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Tutor state changed");
            self.state = next;
        }
    }

    /// The state to fall back to once listening or a doubt answer is over.
    fn settle(&mut self) {
        let next = if self.has_resumable_lecture() {
            TutorState::Paused
        } else {
            TutorState::Idle
        };
        self.set_state(next);
    }

    /// Cancels the active utterance and the pending advance together.
    fn halt(&mut self) -> Vec<Command> {
        self.speaking = None;
        self.pending_advance = None;
        vec![Command::CancelSpeech, Command::CancelAdvance]
    }

    fn stop_listening_if_active(&self, commands: &mut Vec<Command>) {
        if self.state == TutorState::Listening {
            commands.push(Command::StopListening);
        }
    }

    fn speak(&mut self, text: String, purpose: SpeechPurpose) -> Command {
        self.next_utterance += 1;
        let utterance = UtteranceId(self.next_utterance);
        self.speaking = Some((utterance, purpose));
        Command::Speak { utterance, text }
    }

    /// Writes the current chunk on the board (once) and speaks it.
    fn play_current(&mut self) -> Vec<Command> {
        let Some(lecture) = self.lecture.as_mut() else {
            return Vec::new();
        };
        if let Some(text) = lecture.take_unwritten_current() {
            self.whiteboard.write_chunk(&text);
        }
        let Some(chunk) = lecture.current() else {
            return Vec::new();
        };
        debug!(step = lecture.cursor() + 1, total = lecture.len(), chunk = %chunk.id, "Playing chunk");
        let text = chunk.text.clone();
        vec![self.speak(text, SpeechPurpose::Chunk)]
    }

    /// A new topic was submitted: drop the old lecture and wait for the plan.
    pub fn begin_topic(&mut self) -> Vec<Command> {
        let mut commands = self.halt();
        self.stop_listening_if_active(&mut commands);
        self.lecture = None;
        self.set_state(TutorState::Preparing);
        commands
    }

    /// A doubt was submitted during a lecture. Returns the commands together
    /// with the position the lecture was interrupted at.
    pub fn begin_doubt(&mut self) -> (Vec<Command>, DoubtContext) {
        let (cursor, total) = self.progress().unwrap_or((0, 0));
        let commands = self.halt();
        self.set_state(TutorState::AnsweringDoubt);
        (
            commands,
            DoubtContext {
                step: cursor + 1,
                total,
            },
        )
    }

    /// Builds a fresh queue from a lecture plan and starts playing it.
    pub fn start_lecture(&mut self, response_text: &str) -> Vec<Command> {
        let mut commands = self.halt();
        self.stop_listening_if_active(&mut commands);
        self.whiteboard.clear();

        let chunks = build_queue(response_text);
        if chunks.is_empty() {
            info!("Lecture plan contained no chunks");
            self.lecture = None;
            self.set_state(TutorState::Idle);
            return commands;
        }

        info!(chunks = chunks.len(), "Starting lecture");
        self.lecture = Some(Lecture::new(chunks));
        self.set_state(TutorState::Teaching);
        commands.extend(self.play_current());
        commands
    }

    /// Writes the doubt answer on the board and speaks it.
    pub fn deliver_doubt_answer(&mut self, answer: &str) -> Vec<Command> {
        let mut commands = self.halt();
        self.whiteboard.append_doubt_answer(answer);
        commands.push(self.speak(answer.to_string(), SpeechPurpose::DoubtAnswer));
        commands
    }

    /// The student raised a hand. Only meaningful while teaching.
    pub fn interrupt(&mut self) -> Vec<Command> {
        if self.state != TutorState::Teaching {
            debug!(state = %self.state, "Ignoring interrupt outside of teaching");
            return Vec::new();
        }
        let commands = self.halt();
        self.set_state(TutorState::Paused);
        info!(cursor = ?self.cursor(), "Lecture paused");
        commands
    }

    /// Continues a paused lecture by speaking the current chunk again.
    pub fn resume(&mut self) -> Vec<Command> {
        if self.state != TutorState::Paused || !self.has_resumable_lecture() {
            debug!(state = %self.state, "Nothing to resume");
            return Vec::new();
        }
        self.set_state(TutorState::Teaching);
        info!(cursor = ?self.cursor(), "Lecture resumed");
        self.play_current()
    }

    /// Speech for `utterance` ended normally or with a non-benign error.
    pub fn on_speech_finished(&mut self, utterance: UtteranceId) -> Vec<Command> {
        match self.speaking {
            Some((active, purpose)) if active == utterance => {
                self.speaking = None;
                match purpose {
                    SpeechPurpose::Chunk if self.state == TutorState::Teaching => {
                        if let Some(lecture) = self.lecture.as_mut() {
                            lecture.mark_current_played();
                        }
                        self.next_advance += 1;
                        let token = AdvanceToken(self.next_advance);
                        self.pending_advance = Some(token);
                        vec![Command::ScheduleAdvance { token }]
                    }
                    SpeechPurpose::DoubtAnswer if self.state == TutorState::AnsweringDoubt => {
                        self.settle();
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            _ => {
                debug!(%utterance, "Ignoring completion of a stale utterance");
                Vec::new()
            }
        }
    }

    /// The pacing delay after a chunk elapsed.
    pub fn on_advance_due(&mut self, token: AdvanceToken) -> Vec<Command> {
        if self.pending_advance != Some(token) {
            debug!(?token, "Ignoring cancelled advance");
            return Vec::new();
        }
        self.pending_advance = None;
        if self.state != TutorState::Teaching {
            return Vec::new();
        }
        let Some(lecture) = self.lecture.as_mut() else {
            return Vec::new();
        };
        lecture.advance();
        if lecture.is_finished() {
            info!(chunks = lecture.len(), "Lecture finished");
            self.set_state(TutorState::Idle);
            return Vec::new();
        }
        self.play_current()
    }

    /// Voice input button pressed.
    pub fn toggle_listening(&mut self, available: bool) -> Result<Vec<Command>, TutorError> {
        if self.state == TutorState::Listening {
            self.settle();
            return Ok(vec![Command::StopListening]);
        }
        if !available {
            return Err(TutorError::SpeechInputUnavailable);
        }
        let mut commands = match self.state {
            TutorState::Teaching => self.interrupt(),
            TutorState::Idle | TutorState::Paused => Vec::new(),
            other => {
                debug!(state = %other, "Voice input not available in this state");
                return Ok(Vec::new());
            }
        };
        commands.push(Command::StartListening);
        self.set_state(TutorState::Listening);
        Ok(commands)
    }

    /// The recognition session delivered a transcript, ended or failed.
    pub fn on_listening_finished(&mut self) {
        if self.state == TutorState::Listening {
            self.settle();
        }
    }

    /// The provider request failed: abandon everything and go idle.
    pub fn abandon(&mut self) -> Vec<Command> {
        let mut commands = self.halt();
        self.stop_listening_if_active(&mut commands);
        self.lecture = None;
        self.set_state(TutorState::Idle);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spoken(commands: &[Command]) -> Option<(UtteranceId, String)> {
        commands.iter().find_map(|c| match c {
            Command::Speak { utterance, text } => Some((*utterance, text.clone())),
            _ => None,
        })
    }

    fn scheduled(commands: &[Command]) -> Option<AdvanceToken> {
        commands.iter().find_map(|c| match c {
            Command::ScheduleAdvance { token } => Some(*token),
            _ => None,
        })
    }

    /// Finishes the current chunk and lets the pacing delay elapse.
    fn complete_chunk(engine: &mut LectureEngine) -> Vec<Command> {
        let utterance = engine.active_utterance().expect("a chunk is being spoken");
        let token = scheduled(&engine.on_speech_finished(utterance)).expect("advance scheduled");
        engine.on_advance_due(token)
    }

    fn teaching(plan: &str) -> LectureEngine {
        let mut engine = LectureEngine::new();
        engine.begin_topic();
        engine.start_lecture(plan);
        engine
    }

    #[test]
    fn test_start_lecture_writes_and_speaks_first_chunk() {
        let mut engine = LectureEngine::new();
        assert!(engine.begin_topic().contains(&Command::CancelSpeech));
        assert_eq!(engine.state(), TutorState::Preparing);

        let commands = engine.start_lecture("Step one. ||| Step two. ||| ");
        assert_eq!(engine.state(), TutorState::Teaching);
        assert_eq!(engine.progress(), Some((0, 2)));
        assert_eq!(engine.whiteboard().content(), "Step one.");
        assert_eq!(spoken(&commands).unwrap().1, "Step one.");
    }

    #[test]
    fn test_lecture_plays_to_completion_then_idles() {
        let mut engine = teaching("one ||| two ||| three");

        let commands = complete_chunk(&mut engine);
        assert_eq!(spoken(&commands).unwrap().1, "two");
        assert_eq!(engine.cursor(), Some(1));

        complete_chunk(&mut engine);
        assert_eq!(engine.cursor(), Some(2));

        let commands = complete_chunk(&mut engine);
        assert!(commands.is_empty());
        assert_eq!(engine.state(), TutorState::Idle);
        assert_eq!(engine.cursor(), Some(3));
        assert_eq!(engine.whiteboard().content(), "one\n\ntwo\n\nthree");
        assert!(engine.lecture().unwrap().chunks().iter().all(|c| c.is_played));
    }

    #[test]
    fn test_consecutive_identical_chunks_are_both_written() {
        let mut engine = teaching(
            "Repeat after me: sin theta. ||| Repeat after me: sin theta. ||| Done.",
        );
        complete_chunk(&mut engine);
        complete_chunk(&mut engine);
        assert_eq!(
            engine.whiteboard().content(),
            "Repeat after me: sin theta.\n\nRepeat after me: sin theta.\n\nDone."
        );

        engine.interrupt();
        engine.resume();
        assert_eq!(engine.whiteboard().content().matches("Done.").count(), 1);
    }

    #[test]
    fn test_resume_after_finish_is_noop() {
        let mut engine = teaching("only step");
        complete_chunk(&mut engine);
        assert_eq!(engine.state(), TutorState::Idle);

        assert!(engine.resume().is_empty());
        assert_eq!(engine.state(), TutorState::Idle);
    }

    #[test]
    fn test_interrupt_cancels_speech_and_pending_advance() {
        let mut engine = teaching("one ||| two");
        let utterance = engine.active_utterance().unwrap();
        let token = scheduled(&engine.on_speech_finished(utterance)).unwrap();
        assert!(engine.has_pending_advance());

        let commands = engine.interrupt();
        assert_eq!(commands, vec![Command::CancelSpeech, Command::CancelAdvance]);
        assert_eq!(engine.state(), TutorState::Paused);
        assert!(!engine.has_pending_advance());

        // A timer that fires anyway must not move the cursor.
        assert!(engine.on_advance_due(token).is_empty());
        assert_eq!(engine.cursor(), Some(0));
        assert_eq!(engine.state(), TutorState::Paused);
    }

    #[test]
    fn test_resume_continues_from_same_cursor() {
        let mut engine = teaching("one ||| two ||| three");
        complete_chunk(&mut engine);
        engine.interrupt();

        let commands = engine.resume();
        assert_eq!(engine.state(), TutorState::Teaching);
        assert_eq!(engine.cursor(), Some(1));
        assert_eq!(spoken(&commands).unwrap().1, "two");
        // Re-speaking does not write the chunk a second time.
        assert_eq!(engine.whiteboard().content(), "one\n\ntwo");
    }

    #[test]
    fn test_stale_speech_completion_is_ignored() {
        let mut engine = teaching("one ||| two");
        let first = engine.active_utterance().unwrap();
        engine.interrupt();
        engine.resume();
        let second = engine.active_utterance().unwrap();
        assert_ne!(first, second);

        assert!(engine.on_speech_finished(first).is_empty());
        assert!(!engine.has_pending_advance());
        assert!(scheduled(&engine.on_speech_finished(second)).is_some());
    }

    #[test]
    fn test_interrupt_outside_teaching_is_noop() {
        let mut engine = LectureEngine::new();
        assert!(engine.interrupt().is_empty());
        assert_eq!(engine.state(), TutorState::Idle);
    }

    #[test]
    fn test_doubt_context_reports_one_based_step() {
        let mut engine = teaching("a ||| b ||| c ||| d ||| e");
        complete_chunk(&mut engine);
        complete_chunk(&mut engine);
        assert_eq!(engine.cursor(), Some(2));

        let (commands, context) = engine.begin_doubt();
        assert!(commands.contains(&Command::CancelSpeech));
        assert_eq!(context, DoubtContext { step: 3, total: 5 });
        assert_eq!(engine.state(), TutorState::AnsweringDoubt);
    }

    #[test]
    fn test_doubt_answer_returns_to_paused_with_lecture() {
        let mut engine = teaching("a ||| b");
        engine.interrupt();
        engine.begin_doubt();

        let commands = engine.deliver_doubt_answer("Theta ek angle hai.");
        let (utterance, text) = spoken(&commands).unwrap();
        assert_eq!(text, "Theta ek angle hai.");
        assert!(engine.whiteboard().content().ends_with("> **Doubt Solved:** Theta ek angle hai."));

        engine.on_speech_finished(utterance);
        assert_eq!(engine.state(), TutorState::Paused);
        assert_eq!(engine.cursor(), Some(0));
    }

    #[test]
    fn test_doubt_answer_without_lecture_returns_to_idle() {
        let mut engine = teaching("only");
        complete_chunk(&mut engine);
        engine.begin_doubt();
        let (utterance, _) = spoken(&engine.deliver_doubt_answer("Answer")).unwrap();
        engine.on_speech_finished(utterance);
        assert_eq!(engine.state(), TutorState::Idle);
    }

    #[test]
    fn test_new_topic_discards_old_queue() {
        let mut engine = teaching("old one ||| old two");
        let old_ids: Vec<String> = engine
            .lecture()
            .unwrap()
            .chunks()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        engine.interrupt();
        engine.abandon();
        engine.begin_topic();
        assert!(engine.lecture().is_none());
        assert_eq!(engine.cursor(), None);

        engine.start_lecture("new one ||| new two ||| new three");
        let lecture = engine.lecture().unwrap();
        assert_eq!(lecture.len(), 3);
        assert!(lecture.chunks().iter().all(|c| !old_ids.contains(&c.id)));
        assert_eq!(engine.whiteboard().content(), "new one");
    }

    #[test]
    fn test_empty_plan_goes_idle() {
        let mut engine = LectureEngine::new();
        engine.begin_topic();
        let commands = engine.start_lecture(" ||| ");
        assert!(spoken(&commands).is_none());
        assert_eq!(engine.state(), TutorState::Idle);
        assert!(engine.lecture().is_none());
    }

    #[test]
    fn test_toggle_listening_while_teaching_interrupts() {
        let mut engine = teaching("a ||| b");
        let commands = engine.toggle_listening(true).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::CancelSpeech,
                Command::CancelAdvance,
                Command::StartListening
            ]
        );
        assert_eq!(engine.state(), TutorState::Listening);

        engine.on_listening_finished();
        assert_eq!(engine.state(), TutorState::Paused);
    }

    #[test]
    fn test_toggle_listening_off_without_lecture_goes_idle() {
        let mut engine = LectureEngine::new();
        engine.toggle_listening(true).unwrap();
        assert_eq!(engine.state(), TutorState::Listening);

        let commands = engine.toggle_listening(true).unwrap();
        assert_eq!(commands, vec![Command::StopListening]);
        assert_eq!(engine.state(), TutorState::Idle);
    }

    #[test]
    fn test_toggle_listening_unavailable_keeps_state() {
        let mut engine = teaching("a ||| b");
        let err = engine.toggle_listening(false).unwrap_err();
        assert!(matches!(err, TutorError::SpeechInputUnavailable));
        assert_eq!(engine.state(), TutorState::Teaching);
    }

    #[test]
    fn test_listening_end_after_state_moved_on_is_ignored() {
        let mut engine = LectureEngine::new();
        engine.toggle_listening(true).unwrap();
        let commands = engine.begin_topic();
        assert!(commands.contains(&Command::StopListening));
        engine.on_listening_finished();
        assert_eq!(engine.state(), TutorState::Preparing);
    }

    #[test]
    fn test_abandon_forces_idle() {
        let mut engine = teaching("a ||| b");
        engine.begin_doubt();
        engine.abandon();
        assert_eq!(engine.state(), TutorState::Idle);
        assert!(engine.lecture().is_none());
        assert!(engine.active_utterance().is_none());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TutorState::AnsweringDoubt).unwrap(),
            "\"answering_doubt\""
        );
        assert_eq!(TutorState::Paused.to_string(), "paused");
    }
}
