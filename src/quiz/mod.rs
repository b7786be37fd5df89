//! Quiz content: the data model, prompt construction, and the generation and
//! grading adapters around the completion service.

pub mod generation;
pub mod grading;
pub mod model;
pub mod prompt;

pub use generation::{BookCheck, QuizGenerator};
pub use grading::{grade_mcqs, GradingResult, OpenEndedEvaluation, QuizGrader, SectionScore};
pub use model::*;
