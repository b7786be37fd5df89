use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use book_quiz::clients::MockHandle;
use book_quiz::error::ValidationError;
use book_quiz::quiz::model::{AgeRange, QuizConfig, Submission};
use book_quiz::server::error::GENERATION_FAILED;
use book_quiz::server::handlers::{generate, health_check, submit};
use book_quiz::server::{create_router, AppError, AppState};
use book_quiz::session::{run_generation, run_submission, AgeBackgrounds, HttpQuizApi, MemoryStorage, NoSpeechEngine, Phase, QuizSession};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use test_utils::*;

fn state(responses: Vec<book_quiz::clients::MockResponse>) -> (AppState, Arc<MockHandle>) {
    let (resolver, handle) = mock_resolver(responses);
    (AppState::new(resolver), handle)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn form(book: &str, age: Option<AgeRange>, use_generic: bool) -> QuizConfig {
    QuizConfig { book: book.into(), chapters: "all".into(), age_range: age, use_generic }
}

#[tokio::test]
async fn health_reports_version() {
    let Json(body) = health_check().await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn missing_book_is_rejected_before_model_call() {
    let (state, handle) = state(vec![quiz_reply(None)]);

    let err = generate(State(state), Ok(Json(form("   ", Some(AgeRange::Middle), false))))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(ValidationError::MissingBook)));
    assert_eq!(handle.call_count(), 0);
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Please enter a book name or select generic questions."
    );
}

#[tokio::test]
async fn generic_generation_returns_quiz() {
    let (state, _handle) = state(vec![quiz_reply(None)]);

    let Json(quiz) = generate(State(state), Ok(Json(form("", Some(AgeRange::Early), true))))
        .await
        .unwrap();

    assert_eq!(quiz.mcqs.len(), 6);
    assert_eq!(quiz.open_ended.len(), 4);
    let json = serde_json::to_value(&quiz).unwrap();
    assert_eq!(json["isBookKnown"], true);
    assert!(json.get("warning").is_none());
    assert_eq!(json["openEnded"][0]["keyPoints"][0], "theme");
}

#[tokio::test]
async fn generation_failure_is_bad_gateway() {
    let (state, _handle) = state(vec![fail("boom")]);

    let err = generate(State(state), Ok(Json(form("", Some(AgeRange::Teen), true))))
        .await
        .unwrap_err();

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], GENERATION_FAILED);
}

#[tokio::test]
async fn submit_scores_mcqs_locally() {
    let (state, handle) = state(vec![]);
    let quiz = sample_quiz(AgeRange::Middle);
    let submission = Submission::new(&quiz, answers(&[("mcq1", "b"), ("mcq2", "a")]));

    let Json(response) = submit(State(state), Ok(Json(submission))).await.unwrap();

    assert_eq!(handle.call_count(), 0);
    assert_eq!(response.score, "Total Score: 1/46 (2%)");
    assert_eq!(response.percentage, 2);
    assert!(response.feedback.contains("Question 1 (MCQ): Correct!"));
    assert_eq!(response.feedback_lines.len(), 10);
    assert_eq!(response.feedback_lines[7], "Question 8 (Open): Score: 0/10. No response provided.");
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["feedbackLines"][0], "Question 1 (MCQ): Correct!");
}

async fn spawn_server(state: AppState, static_dir: &Path) -> String {
    let app = create_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn client_session_against_running_server() {
    let (state, handle) = state(vec![
        book_check_reply(true),
        quiz_reply(None),
        grading_reply(&[(7, 7.0, "Good use of detail.")]),
    ]);
    let base = spawn_server(state, Path::new("public")).await;
    let api = HttpQuizApi::new(&base);

    let mut session = QuizSession::restore(MemoryStorage::new(), Box::new(NoSpeechEngine), Instant::now());
    session
        .edit_config(|c| {
            c.book = "Holes".into();
            c.age_range = Some(AgeRange::Preteen);
        })
        .unwrap();
    assert!(run_generation(&mut session, &api, &AgeBackgrounds).await.unwrap());
    assert_eq!(session.phase(), Phase::Taking);

    session.select_option(1, book_quiz::quiz::model::OptionLetter::B).unwrap();
    session.write_answer(1, "Stanley kept digging.", Instant::now()).unwrap();
    assert!(run_submission(&mut session, &api).await.unwrap());

    assert_eq!(session.phase(), Phase::Results);
    let results = session.results().unwrap();
    assert_eq!(results.total_score, 8);
    assert_eq!(results.score, "Total Score: 8/46 (17%)");
    assert_eq!(handle.call_count(), 3);
}

#[tokio::test]
async fn server_errors_reach_the_client_as_messages() {
    let (state, _handle) = state(vec![]);
    let base = spawn_server(state, Path::new("public")).await;

    let response = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&serde_json::json!({"book": "Holes", "chapters": "all", "ageRange": "", "useGeneric": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Please select an age range.");

    let response = reqwest::Client::new()
        .post(format!("{}/submit", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Bad request:"));
}

#[tokio::test]
async fn static_files_are_served_at_root() {
    let dir = std::env::temp_dir().join(format!("book_quiz_static_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<h1>Book Quiz</h1>").unwrap();
    let (state, _handle) = state(vec![]);
    let base = spawn_server(state, &dir).await;

    let page = reqwest::get(format!("{}/", base)).await.unwrap().text().await.unwrap();
    assert_eq!(page, "<h1>Book Quiz</h1>");
    std::fs::remove_dir_all(dir).unwrap();
}
