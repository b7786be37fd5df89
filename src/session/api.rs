//! Client for the quiz server and the async halves of the session transitions.

use crate::error::{SessionError, TransportError};
use crate::quiz::model::{GeneratedQuiz, QuizRequest, Submission, SubmitResponse};
use crate::session::background::BackgroundSource;
use crate::session::lifecycle::QuizSession;
use crate::session::storage::Storage;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

#[async_trait]
pub trait QuizApi: Send + Sync {
    async fn generate(&self, request: &QuizRequest) -> Result<GeneratedQuiz, TransportError>;
    async fn submit(&self, submission: &Submission) -> Result<SubmitResponse, TransportError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct HttpQuizApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpQuizApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, TransportError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Request failed").to_string());
        Err(TransportError::Status { status: status.as_u16(), message })
    }
}

#[async_trait]
impl QuizApi for HttpQuizApi {
    #[instrument(target = "book_quiz::api", skip(self, request), fields(book = %request.book))]
    async fn generate(&self, request: &QuizRequest) -> Result<GeneratedQuiz, TransportError> {
        self.post("/generate", request).await
    }

    #[instrument(target = "book_quiz::api", skip_all)]
    async fn submit(&self, submission: &Submission) -> Result<SubmitResponse, TransportError> {
        self.post("/submit", submission).await
    }
}

/// Text shown to the user for a failed call.
pub fn failure_message(error: &TransportError) -> String {
    match error {
        TransportError::Status { message, .. } => message.clone(),
        TransportError::Http(e) => e.to_string(),
    }
}

/// Run a full generation round trip. The cover lookup runs alongside the
/// server call. Returns whether the reply was applied.
pub async fn run_generation<S: Storage>(
    session: &mut QuizSession<S>,
    api: &dyn QuizApi,
    backgrounds: &dyn BackgroundSource,
) -> Result<bool, SessionError> {
    let (ticket, request) = session.begin_generation()?;
    let (outcome, background) = tokio::join!(api.generate(&request), backgrounds.background_for(&request));
    let outcome = outcome.map_err(|e| {
        warn!(error = %e, "Quiz generation request failed");
        failure_message(&e)
    });
    Ok(session.finish_generation(ticket, outcome, background))
}

/// Submit the current answers and apply the grading reply.
pub async fn run_submission<S: Storage>(session: &mut QuizSession<S>, api: &dyn QuizApi) -> Result<bool, SessionError> {
    let (ticket, submission) = session.begin_submission()?;
    let outcome = api.submit(&submission).await.map_err(|e| {
        warn!(error = %e, "Quiz submission failed");
        failure_message(&e)
    });
    Ok(session.finish_submission(ticket, outcome))
}
