//! Client-side quiz lifecycle.
//!
//! ```text
//! Input ──begin_generation──▶ Loading(Generating) ──ok──▶ Taking ──begin_submission──▶ Loading(Evaluating) ──ok──▶ Results
//!   ▲                               │ err                    ▲                               │ err                    │
//!   └───────────────────────────────┘                        └───────────────────────────────┘          retake / start_new
//! ```
//!
//! Async work is split into `begin_*` (issues a [`Ticket`]) and `finish_*`
//! (applies the reply). Every navigation advances the session generation, so a
//! reply whose ticket predates it is dropped.

use crate::error::SessionError;
use crate::quiz::model::{AnswerSet, GeneratedQuiz, OptionLetter, Quiz, QuizConfig, QuizRequest, Submission, SubmitResponse};
use crate::session::autosave::Autosave;
use crate::session::background::Background;
use crate::session::speech::{CaptureId, MicButton, MicToggle, SpeechController, SpeechEngine, FAILED_MESSAGE};
use crate::session::storage::{load, save, Storage, ANSWERS_KEY, CONFIG_KEY, QUIZ_KEY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const RELOADED_BOOK_WARNING: &str = "Book not found, using generic questions.";
pub const ANSWERS_RESET: &str = "Quiz answers reset.";
pub const RETURNED_TO_SEARCH: &str = "Returned to search.";
pub const READY_FOR_NEW: &str = "Ready for new quiz.";
pub const FORM_RESET: &str = "Form reset.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingKind {
    Generating,
    Evaluating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Input,
    Loading(LoadingKind),
    Taking,
    Results,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Input => "on the input form",
            Phase::Loading(LoadingKind::Generating) => "generating a quiz",
            Phase::Loading(LoadingKind::Evaluating) => "evaluating answers",
            Phase::Taking => "taking the quiz",
            Phase::Results => "showing results",
        })
    }
}

/// Proof that a request was issued by this session at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    kind: LoadingKind,
}

impl Ticket {
    pub fn kind(&self) -> LoadingKind {
        self.kind
    }
}

/// What is persisted under `generatedQuiz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuiz {
    #[serde(flatten)]
    pub quiz: Quiz,
    #[serde(flatten)]
    pub background: Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub tone: Tone,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { text: text.into(), tone: Tone::Info }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), tone: Tone::Error }
    }
}

pub struct QuizSession<S: Storage> {
    storage: S,
    phase: Phase,
    generation: u64,
    config: QuizConfig,
    in_flight: Option<QuizRequest>,
    quiz: Option<StoredQuiz>,
    warnings: Vec<String>,
    answers: AnswerSet,
    results: Option<SubmitResponse>,
    status: Option<StatusMessage>,
    speech: SpeechController,
    config_autosave: Autosave,
    answers_autosave: Autosave,
}

impl<S: Storage> fmt::Debug for QuizSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .field("config", &self.config)
            .field("has_quiz", &self.quiz.is_some())
            .field("answers", &self.answers)
            .field("speech", &self.speech)
            .finish()
    }
}

impl<S: Storage> QuizSession<S> {
    /// Rebuild a session from storage. A persisted quiz resumes straight into
    /// `Taking` with its saved answers; otherwise the form is refilled.
    pub fn restore(storage: S, engine: Box<dyn SpeechEngine>, now: Instant) -> Self {
        let mut session = Self {
            phase: Phase::Input,
            generation: 0,
            config: QuizConfig::default(),
            in_flight: None,
            quiz: None,
            warnings: Vec::new(),
            answers: AnswerSet::new(),
            results: None,
            status: None,
            speech: SpeechController::new(engine),
            config_autosave: Autosave::new(CONFIG_KEY, now),
            answers_autosave: Autosave::new(ANSWERS_KEY, now),
            storage,
        };

        if let Some(config) = load::<QuizConfig>(&session.storage, CONFIG_KEY) {
            session.config_autosave.mark_persisted(&config);
            session.config = config;
        }

        if let Some(stored) = load::<StoredQuiz>(&session.storage, QUIZ_KEY) {
            if !stored.quiz.is_book_known {
                session.warnings.push(RELOADED_BOOK_WARNING.to_string());
            }
            session.warnings.extend(stored.background.warning.clone());
            session.answers = session.saved_answers_for(&stored.quiz);
            session.quiz = Some(stored);
            session.phase = Phase::Taking;
            info!(answers = session.answers.iter().count(), "Resumed saved quiz");
        }
        session
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref().map(|s| &s.quiz)
    }

    pub fn background(&self) -> Option<&Background> {
        self.quiz.as_ref().map(|s| &s.background)
    }

    /// Notices shown above the quiz: book warning first, then cover warning.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn results(&self) -> Option<&SubmitResponse> {
        self.results.as_ref()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn take_status(&mut self) -> Option<StatusMessage> {
        self.status.take()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn mic_button(&self, open_n: usize) -> MicButton {
        self.speech.button(open_n)
    }

    pub fn active_capture(&self) -> Option<usize> {
        self.speech.active_target()
    }

    fn require(&self, action: &'static str, allowed: &[Phase]) -> Result<(), SessionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::WrongPhase { action, phase: self.phase.to_string() })
        }
    }

    fn stored_quiz(&self) -> Result<&StoredQuiz, SessionError> {
        self.quiz.as_ref().ok_or(SessionError::NoQuiz)
    }

    fn accepts(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation && self.phase == Phase::Loading(ticket.kind)
    }

    fn saved_answers_for(&mut self, quiz: &Quiz) -> AnswerSet {
        match load::<AnswerSet>(&self.storage, ANSWERS_KEY) {
            Some(saved) => {
                self.answers_autosave.mark_persisted(&saved);
                saved.restricted_to(quiz)
            }
            None => AnswerSet::new(),
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(key, error = %e, "Failed to clear stored value");
        }
    }

    // ---- Input -------------------------------------------------------------

    /// Change the form. Saved immediately when the snapshot differs.
    pub fn edit_config(&mut self, edit: impl FnOnce(&mut QuizConfig)) -> Result<(), SessionError> {
        self.require("edit the form", &[Phase::Input])?;
        edit(&mut self.config);
        self.config_autosave.save_now(&mut self.storage, &self.config);
        Ok(())
    }

    pub fn reset_config(&mut self) -> Result<(), SessionError> {
        self.require("reset the form", &[Phase::Input])?;
        self.config = QuizConfig::default();
        self.remove_key(CONFIG_KEY);
        self.config_autosave.forget();
        self.status = Some(StatusMessage::info(FORM_RESET));
        Ok(())
    }

    /// Validate the form and enter `Loading(Generating)`.
    pub fn begin_generation(&mut self) -> Result<(Ticket, QuizRequest), SessionError> {
        self.require("generate a quiz", &[Phase::Input])?;
        self.config_autosave.save_now(&mut self.storage, &self.config);
        let request = match self.config.validate() {
            Ok(request) => request,
            Err(e) => {
                self.status = Some(StatusMessage::error(e.to_string()));
                return Err(e.into());
            }
        };
        self.generation += 1;
        self.phase = Phase::Loading(LoadingKind::Generating);
        self.in_flight = Some(request.clone());
        self.status = None;
        debug!(generation = self.generation, book = %request.book, "Generation requested");
        Ok((Ticket { generation: self.generation, kind: LoadingKind::Generating }, request))
    }

    /// Apply a generation reply. Returns false when the ticket is stale.
    pub fn finish_generation(
        &mut self,
        ticket: Ticket,
        outcome: Result<GeneratedQuiz, String>,
        background: Background,
    ) -> bool {
        if !self.accepts(ticket) {
            debug!(ticket = ticket.generation, current = self.generation, "Dropping stale generation reply");
            return false;
        }
        let request = self.in_flight.take();
        let (generated, age_range) = match (outcome, request) {
            (Ok(generated), Some(request)) => (generated, request.age_range),
            (Err(message), _) => {
                self.phase = Phase::Input;
                self.status = Some(StatusMessage::error(format!("Failed to generate quiz: {}", message)));
                return true;
            }
            (Ok(_), None) => {
                self.phase = Phase::Input;
                self.status = Some(StatusMessage::error(SessionError::NoQuiz.to_string()));
                return true;
            }
        };

        self.warnings.clear();
        self.warnings.extend(generated.warning.clone());
        self.warnings.extend(background.warning.clone());

        let stored = StoredQuiz { quiz: Quiz::from_generated(generated, age_range), background };
        if let Err(e) = save(&mut self.storage, QUIZ_KEY, &stored) {
            warn!(error = %e, "Failed to persist quiz");
        }
        self.answers = self.saved_answers_for(&stored.quiz);
        self.quiz = Some(stored);
        self.results = None;
        self.phase = Phase::Taking;
        true
    }

    // ---- Taking ------------------------------------------------------------

    pub fn select_option(&mut self, mcq_n: usize, letter: OptionLetter) -> Result<(), SessionError> {
        self.require("answer", &[Phase::Taking])?;
        let quiz = &self.stored_quiz()?.quiz;
        let offered = mcq_n
            .checked_sub(1)
            .and_then(|i| quiz.mcqs.get(i))
            .is_some_and(|mcq| mcq.options.contains_key(&letter));
        if !offered {
            return Err(SessionError::UnknownQuestion(format!("{}{}", AnswerSet::mcq_key(mcq_n), letter)));
        }
        self.answers.set_mcq(mcq_n, letter);
        self.answers_autosave.save_now(&mut self.storage, &self.answers);
        Ok(())
    }

    /// Typed text; persisted after the debounce window via [`tick`](Self::tick).
    pub fn write_answer(&mut self, open_n: usize, text: impl Into<String>, now: Instant) -> Result<(), SessionError> {
        self.require("answer", &[Phase::Taking])?;
        self.check_open(open_n)?;
        self.answers.set_open(open_n, text);
        self.answers_autosave.schedule(now);
        Ok(())
    }

    fn check_open(&self, open_n: usize) -> Result<(), SessionError> {
        let count = self.stored_quiz()?.quiz.open_ended.len();
        if (1..=count).contains(&open_n) {
            Ok(())
        } else {
            Err(SessionError::UnknownQuestion(AnswerSet::open_key(open_n)))
        }
    }

    /// Timer hook: flushes debounced text and runs the interval backstop for the
    /// visible view. Returns whether storage was written.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Input => self.config_autosave.poll(&mut self.storage, &self.config, now),
            Phase::Taking => self.answers_autosave.poll(&mut self.storage, &self.answers, now),
            _ => false,
        }
    }

    pub fn reset_answers(&mut self) -> Result<(), SessionError> {
        self.require("reset answers", &[Phase::Taking])?;
        self.stored_quiz()?;
        self.speech.stop();
        self.answers.clear();
        self.remove_key(ANSWERS_KEY);
        self.answers_autosave.forget();
        self.status = Some(StatusMessage::info(ANSWERS_RESET));
        Ok(())
    }

    pub fn toggle_mic(&mut self, open_n: usize) -> Result<MicToggle, SessionError> {
        self.require("record an answer", &[Phase::Taking])?;
        self.check_open(open_n)?;
        Ok(self.speech.toggle(open_n))
    }

    /// Transcript update: replaces the target answer and saves it.
    pub fn speech_result<T: AsRef<str>>(&mut self, capture: CaptureId, segments: &[T]) -> bool {
        let Some((target, transcript)) = self.speech.on_result(capture, segments) else {
            return false;
        };
        self.answers.set_open(target, transcript);
        self.answers_autosave.save_now(&mut self.storage, &self.answers);
        true
    }

    pub fn speech_error(&mut self, capture: CaptureId, error: &str) {
        if self.speech.on_error(capture, error).is_some() {
            self.status = Some(StatusMessage::error(FAILED_MESSAGE));
        }
    }

    pub fn speech_end(&mut self, capture: CaptureId) {
        self.speech.on_end(capture);
    }

    /// Stop any capture, snapshot the answers and enter `Loading(Evaluating)`.
    pub fn begin_submission(&mut self) -> Result<(Ticket, Submission), SessionError> {
        self.require("submit", &[Phase::Taking])?;
        let quiz = self.stored_quiz()?.quiz.clone();
        self.speech.stop();
        self.answers_autosave.save_now(&mut self.storage, &self.answers);

        let submission = Submission::new(&quiz, self.answers.clone());
        self.generation += 1;
        self.phase = Phase::Loading(LoadingKind::Evaluating);
        self.status = None;
        debug!(generation = self.generation, "Submission requested");
        Ok((Ticket { generation: self.generation, kind: LoadingKind::Evaluating }, submission))
    }

    /// Apply a grading reply. Returns false when the ticket is stale.
    pub fn finish_submission(&mut self, ticket: Ticket, outcome: Result<SubmitResponse, String>) -> bool {
        if !self.accepts(ticket) {
            debug!(ticket = ticket.generation, current = self.generation, "Dropping stale grading reply");
            return false;
        }
        match outcome {
            Ok(response) => {
                info!(score = %response.score, "Quiz graded");
                self.results = Some(response);
                self.remove_key(ANSWERS_KEY);
                self.answers_autosave.forget();
                self.phase = Phase::Results;
            }
            Err(message) => {
                self.phase = Phase::Taking;
                self.status = Some(StatusMessage::error(format!("Failed to submit quiz: {}", message)));
            }
        }
        true
    }

    // ---- Results -----------------------------------------------------------

    /// Take the same quiz again with a blank answer set.
    pub fn retake(&mut self) -> Result<(), SessionError> {
        self.require("retake", &[Phase::Results])?;
        self.stored_quiz()?;
        self.generation += 1;
        self.answers.clear();
        self.answers_autosave.forget();
        self.results = None;
        self.phase = Phase::Taking;
        Ok(())
    }

    pub fn back_to_input(&mut self) -> Result<(), SessionError> {
        self.require(
            "go back",
            &[
                Phase::Taking,
                Phase::Results,
                Phase::Loading(LoadingKind::Generating),
                Phase::Loading(LoadingKind::Evaluating),
            ],
        )?;
        self.leave_quiz(RETURNED_TO_SEARCH);
        Ok(())
    }

    pub fn start_new(&mut self) -> Result<(), SessionError> {
        self.require("start a new quiz", &[Phase::Results])?;
        self.leave_quiz(READY_FOR_NEW);
        Ok(())
    }

    fn leave_quiz(&mut self, message: &str) {
        self.speech.stop();
        self.remove_key(QUIZ_KEY);
        self.remove_key(ANSWERS_KEY);
        self.generation += 1;
        self.in_flight = None;
        self.quiz = None;
        self.warnings.clear();
        self.answers.clear();
        self.answers_autosave.forget();
        self.results = None;
        self.phase = Phase::Input;
        self.status = Some(StatusMessage::info(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::{AgeRange, Mcq, OpenEndedQuestion};
    use crate::session::background::BackgroundKind;
    use crate::session::speech::NoSpeechEngine;
    use crate::session::storage::MemoryStorage;

    fn generated() -> GeneratedQuiz {
        GeneratedQuiz {
            mcqs: (0..6)
                .map(|i| Mcq {
                    question: format!("Q{}", i + 1),
                    options: OptionLetter::ALL.iter().map(|l| (*l, l.to_string())).collect(),
                    correct: OptionLetter::A,
                })
                .collect(),
            open_ended: (0..4)
                .map(|i| OpenEndedQuestion { question: format!("O{}", i + 1), key_points: vec![] })
                .collect(),
            is_book_known: true,
            warning: None,
        }
    }

    fn background() -> Background {
        Background { url: "u".into(), kind: BackgroundKind::Cover, warning: None }
    }

    fn taking(now: Instant) -> QuizSession<MemoryStorage> {
        let mut session = QuizSession::restore(MemoryStorage::new(), Box::new(NoSpeechEngine), now);
        session
            .edit_config(|c| {
                c.use_generic = true;
                c.age_range = Some(AgeRange::Early);
            })
            .unwrap();
        let (ticket, _) = session.begin_generation().unwrap();
        assert!(session.finish_generation(ticket, Ok(generated()), background()));
        session
    }

    #[test]
    fn phase_gates_operations() {
        let now = Instant::now();
        let mut session = QuizSession::restore(MemoryStorage::new(), Box::new(NoSpeechEngine), now);
        let err = session.begin_submission().unwrap_err();
        assert!(matches!(err, SessionError::WrongPhase { action: "submit", .. }));
        assert_eq!(err.to_string(), "cannot submit while on the input form");
    }

    #[test]
    fn stored_quiz_flattens_background() {
        let session = taking(Instant::now());
        let raw = session.storage().get(QUIZ_KEY).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["ageRange"], "5-7");
        assert_eq!(json["backgroundType"], "cover");
        assert_eq!(json["mcqs"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn unknown_mcq_letter_is_rejected() {
        let mut session = taking(Instant::now());
        assert!(session.select_option(7, OptionLetter::A).is_err());
        assert!(session.select_option(0, OptionLetter::A).is_err());
        assert!(session.write_answer(5, "x", Instant::now()).is_err());
    }

    #[test]
    fn retake_resets_answers() {
        let now = Instant::now();
        let mut session = taking(now);
        session.select_option(1, OptionLetter::A).unwrap();
        let (ticket, _) = session.begin_submission().unwrap();
        let response = SubmitResponse {
            feedback: String::new(),
            feedback_lines: Vec::new(),
            score: "Total Score: 1/46 (2%)".into(),
            total_score: 1,
            max_score: 46,
            percentage: 2,
        };
        assert!(session.finish_submission(ticket, Ok(response)));
        session.retake().unwrap();
        assert_eq!(session.phase(), Phase::Taking);
        assert!(session.answers().is_blank());
        assert!(session.results().is_none());
    }
}
