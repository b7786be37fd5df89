pub mod api;
pub mod autosave;
pub mod background;
pub mod lifecycle;
pub mod speech;
pub mod storage;

pub use api::{run_generation, run_submission, HttpQuizApi, QuizApi};
pub use background::{AgeBackgrounds, Background, BackgroundKind, BackgroundSource, CoverFinder};
pub use lifecycle::{LoadingKind, Phase, QuizSession, StatusMessage, StoredQuiz, Ticket, Tone};
pub use speech::{CaptureId, MicButton, MicToggle, NoSpeechEngine, SpeechController, SpeechEngine};
pub use storage::{FileStorage, MemoryStorage, Storage};
