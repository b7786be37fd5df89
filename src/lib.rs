//! Reading-comprehension quiz generation and grading backed by a language-model API.
//!
//! The [`quiz`] module holds the domain and the two service adapters, [`server`]
//! exposes them over HTTP and [`session`] models the client-side lifecycle.

pub mod clients;
pub mod config;
pub mod core;
pub mod error;
pub mod interceptors;
pub mod json_utils;
pub mod quiz;
pub mod server;
pub mod session;

pub use crate::core::{LowLevelClient, QueryResolver, ResolverConfig};
pub use error::{GenerationError, QueryResolverError, SessionError, ValidationError};
pub use json_utils::{decode_reply, extract_all, ReplyShape};
pub use quiz::{QuizGenerator, QuizGrader};
pub use session::QuizSession;
