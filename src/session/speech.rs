//! Speech-to-text capture for open-ended answers.
//!
//! One recognition engine is shared by every question, so at most one question
//! captures at a time. Each start hands the engine a fresh [`CaptureId`]; events
//! carrying an older id belong to a capture that was already stopped and are ignored.

use tracing::{debug, warn};

pub const START_LABEL: &str = "🎤 Start Speaking";
pub const STOP_LABEL: &str = "🎤 Stop Speaking";
pub const UNSUPPORTED_LABEL: &str = "🎤 Not Supported";
pub const FAILED_MESSAGE: &str = "Speech recognition failed. Try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(u64);

/// Platform recognizer.
pub trait SpeechEngine: Send {
    fn is_available(&self) -> bool;
    fn start(&mut self, capture: CaptureId);
    fn stop(&mut self, capture: CaptureId);
}

/// Engine for runtimes without speech recognition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeechEngine;

impl SpeechEngine for NoSpeechEngine {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _capture: CaptureId) {}

    fn stop(&mut self, _capture: CaptureId) {}
}

/// Render state of one question's mic button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicButton {
    pub label: &'static str,
    pub recording: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicToggle {
    Started { capture: CaptureId, stopped: Option<usize> },
    Stopped { target: usize },
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveCapture {
    id: CaptureId,
    target: usize,
}

pub struct SpeechController {
    engine: Box<dyn SpeechEngine>,
    active: Option<ActiveCapture>,
    next_id: u64,
}

impl std::fmt::Debug for SpeechController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechController")
            .field("available", &self.engine.is_available())
            .field("active", &self.active)
            .finish()
    }
}

impl SpeechController {
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self { engine, active: None, next_id: 0 }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    /// Open-ended question number currently capturing, if any.
    pub fn active_target(&self) -> Option<usize> {
        self.active.map(|a| a.target)
    }

    pub fn button(&self, target: usize) -> MicButton {
        if !self.is_available() {
            return MicButton { label: UNSUPPORTED_LABEL, recording: false, disabled: true };
        }
        let recording = self.active_target() == Some(target);
        MicButton {
            label: if recording { STOP_LABEL } else { START_LABEL },
            recording,
            disabled: false,
        }
    }

    /// Click on `target`'s mic: stops it if active, otherwise stops any other
    /// capture and starts this one.
    pub fn toggle(&mut self, target: usize) -> MicToggle {
        if !self.is_available() {
            return MicToggle::Unsupported;
        }
        if self.active_target() == Some(target) {
            self.stop();
            return MicToggle::Stopped { target };
        }
        let stopped = self.stop();
        self.next_id += 1;
        let id = CaptureId(self.next_id);
        self.active = Some(ActiveCapture { id, target });
        self.engine.start(id);
        debug!(target, ?stopped, "Speech capture started");
        MicToggle::Started { capture: id, stopped }
    }

    /// Stop the active capture and return its target.
    pub fn stop(&mut self) -> Option<usize> {
        let active = self.active.take()?;
        self.engine.stop(active.id);
        debug!(target = active.target, "Speech capture stopped");
        Some(active.target)
    }

    /// Joined transcript segments for the live capture; `None` when `capture` is stale.
    pub fn on_result<S: AsRef<str>>(&self, capture: CaptureId, segments: &[S]) -> Option<(usize, String)> {
        let active = self.active.filter(|a| a.id == capture)?;
        let transcript: String = segments.iter().map(AsRef::as_ref).collect();
        Some((active.target, transcript))
    }

    /// Engine failure. Returns the target that was cleared.
    pub fn on_error(&mut self, capture: CaptureId, error: &str) -> Option<usize> {
        let active = self.active.filter(|a| a.id == capture)?;
        warn!(target = active.target, error, "Speech recognition error");
        self.active = None;
        Some(active.target)
    }

    /// Engine stopped on its own.
    pub fn on_end(&mut self, capture: CaptureId) -> Option<usize> {
        let active = self.active.filter(|a| a.id == capture)?;
        self.active = None;
        Some(active.target)
    }
}
