use crate::quiz::model::{GeneratedQuiz, QuizConfig, Submission, SubmitResponse};
use crate::server::app::AppState;
use crate::server::error::{AppError, AppResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::json;
use tracing::instrument;

/// `POST /generate`. The form is validated before any model call.
#[instrument(target = "book_quiz::server", skip_all)]
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<QuizConfig>, JsonRejection>,
) -> AppResult<Json<GeneratedQuiz>> {
    let Json(config) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = config.validate()?;
    let quiz = state.generator.generate_quiz(&request).await?;
    Ok(Json(quiz))
}

/// `POST /submit`. Grading never fails; unscorable answers get zero with feedback.
#[instrument(target = "book_quiz::server", skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(submission) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let result = state.grader.grade(&submission).await;
    Ok(Json(result.to_response()))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
