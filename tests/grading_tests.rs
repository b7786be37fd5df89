use book_quiz::quiz::grading::{EVALUATION_ERROR, NO_RESPONSE, SERVICE_ERROR};
use book_quiz::quiz::model::{AgeRange, Submission};
use book_quiz::quiz::{grade_mcqs, QuizGrader};

use test_utils::*;

const ALL_CORRECT: [(&str, &str); 6] =
    [("mcq1", "b"), ("mcq2", "b"), ("mcq3", "b"), ("mcq4", "b"), ("mcq5", "b"), ("mcq6", "b")];

#[test]
fn correct_mcq_earns_one_point() {
    let quiz = sample_quiz(AgeRange::Middle);
    let section = grade_mcqs(&quiz.mcqs, &answers(&[("mcq1", "b"), ("mcq2", "c")]));

    assert_eq!(section.points, 1);
    assert_eq!(section.max_points, 6);
    assert!(section.fragments[0].contains("Question 1 (MCQ): Correct!"));
    assert!(section.fragments[1].contains("Question 2 (MCQ): Incorrect. Correct is B."));
    // Unanswered counts as incorrect.
    assert!(section.fragments[2].contains("Question 3 (MCQ): Incorrect."));
}

#[test]
fn mcq_grading_is_deterministic() {
    let quiz = sample_quiz(AgeRange::Middle);
    let submitted = answers(&[("mcq1", "b"), ("mcq4", "a")]);
    assert_eq!(grade_mcqs(&quiz.mcqs, &submitted), grade_mcqs(&quiz.mcqs, &submitted));
}

#[tokio::test]
async fn blank_answers_score_zero_without_model_call() {
    let (resolver, handle) = mock_resolver(vec![]);
    let grader = QuizGrader::new(resolver);
    let quiz = sample_quiz(AgeRange::Early);
    let submission = Submission::new(&quiz, answers(&[("open1", "   "), ("open2", "")]));

    let result = grader.grade(&submission).await;

    assert_eq!(handle.call_count(), 0);
    assert_eq!(result.total_score, 0);
    assert_eq!(result.max_score, 46);
    let open_fragments = &result.feedback[6..];
    assert_eq!(open_fragments.len(), 4);
    assert!(open_fragments.iter().all(|f| f.contains(NO_RESPONSE) && f.contains("Score: 0/10")));
}

#[tokio::test]
async fn open_answers_are_batched_and_matched_by_number() {
    let (resolver, handle) = mock_resolver(vec![grading_reply(&[(9, 6.0, "Decent."), (7, 8.0, "Great detail.")])]);
    let grader = QuizGrader::new(resolver);
    let quiz = sample_quiz(AgeRange::Preteen);
    let submission = Submission::new(&quiz, answers(&[("open1", "He was brave."), ("open3", "Home matters.")]));

    let result = grader.grade(&submission).await;

    assert_eq!(handle.call_count(), 1);
    let prompt = &handle.prompts()[0];
    assert!(prompt.contains("\"qNum\": 7"));
    assert!(prompt.contains("\"qNum\": 9"));
    assert!(!prompt.contains("\"qNum\": 8"));
    assert!(prompt.contains("for age range 11-13"));

    assert_eq!(result.total_score, 14);
    assert!(result.feedback[6].contains("Question 7 (Open)") && result.feedback[6].contains("Great detail."));
    assert!(result.feedback[7].contains(NO_RESPONSE));
    assert!(result.feedback[8].contains("Score: 6/10") && result.feedback[8].contains("Decent."));
    assert!(result.feedback[9].contains(NO_RESPONSE));
}

#[tokio::test]
async fn missing_evaluation_scores_zero() {
    let (resolver, _handle) = mock_resolver(vec![grading_reply(&[(7, 9.0, "Strong.")])]);
    let quiz = sample_quiz(AgeRange::Teen);
    let submission = Submission::new(&quiz, answers(&[("open1", "a"), ("open2", "b")]));

    let result = QuizGrader::new(resolver).grade(&submission).await;

    assert_eq!(result.total_score, 9);
    assert!(result.feedback[7].contains(EVALUATION_ERROR));
    assert!(result.feedback[7].contains("Score: 0/10"));
}

#[tokio::test]
async fn grading_failure_zeroes_open_questions_only() {
    let (resolver, _handle) = mock_resolver(vec![fail("service unavailable")]);
    let quiz = sample_quiz(AgeRange::Middle);
    let mut pairs = ALL_CORRECT.to_vec();
    pairs.extend([("open1", "one"), ("open2", "two"), ("open3", "three"), ("open4", "four")]);
    let submission = Submission::new(&quiz, answers(&pairs));

    let result = QuizGrader::new(resolver).grade(&submission).await;

    assert_eq!(result.total_score, 6);
    assert_eq!(result.max_score, 46);
    assert_eq!(result.percentage(), 13);
    assert!(result.feedback[..6].iter().all(|f| f.contains("Correct!")));
    assert!(result.feedback[6..].iter().all(|f| f.contains(SERVICE_ERROR)));
    assert_eq!(result.score_line(), "Total Score: 6/46 (13%)");
}

#[tokio::test]
async fn out_of_range_scores_are_clamped() {
    let (resolver, _handle) = mock_resolver(vec![grading_reply(&[(7, 14.0, "Wow"), (8, -2.0, "Hmm"), (9, 6.6, "ok")])]);
    let quiz = sample_quiz(AgeRange::Middle);
    let submission = Submission::new(&quiz, answers(&[("open1", "x"), ("open2", "y"), ("open3", "z")]));

    let result = QuizGrader::new(resolver).grade(&submission).await;

    assert_eq!(result.total_score, 10 + 0 + 7);
    assert!(result.feedback[6].contains("Score: 10/10"));
    assert!(result.feedback[7].contains("Score: 0/10"));
}

#[tokio::test]
async fn full_marks_and_percentage_bounds() {
    let (resolver, _handle) = mock_resolver(vec![grading_reply(&[
        (7, 10.0, "a"),
        (8, 10.0, "b"),
        (9, 10.0, "c"),
        (10, 10.0, "d"),
    ])]);
    let quiz = sample_quiz(AgeRange::Teen);
    let mut pairs = ALL_CORRECT.to_vec();
    pairs.extend([("open1", "1"), ("open2", "2"), ("open3", "3"), ("open4", "4")]);

    let response = QuizGrader::new(resolver)
        .grade(&Submission::new(&quiz, answers(&pairs)))
        .await
        .to_response();

    assert_eq!(response.total_score, 46);
    assert_eq!(response.percentage, 100);
    assert_eq!(response.score, "Total Score: 46/46 (100%)");
}

#[tokio::test]
async fn feedback_html_is_escaped_and_duplicates_keep_first() {
    let (resolver, _handle) =
        mock_resolver(vec![grading_reply(&[(7, 5.0, "<b>Nice</b> & clear"), (7, 1.0, "duplicate")])]);
    let quiz = sample_quiz(AgeRange::Early);
    let submission = Submission::new(&quiz, answers(&[("open1", "answer")]));

    let result = QuizGrader::new(resolver).grade(&submission).await;

    assert_eq!(result.total_score, 5);
    assert!(result.feedback[6].contains("&lt;b&gt;Nice"));
    assert!(result.feedback[6].contains(" &amp; clear"));
    assert!(!result.feedback[6].contains("<b>"));
    assert!(result.feedback[6].contains("class=\"correct\""));
    assert!(!result.feedback_html().contains("duplicate"));
    assert_eq!(result.lines[6], "Question 7 (Open): Score: 5/10. <b>Nice</b> & clear");
}

#[tokio::test]
async fn question_numbers_written_as_floats_still_match() {
    init_tracing();
    let (resolver, _handle) = mock_resolver(vec![ok(r#"[{"qNum": 7.0, "score": 8, "feedback": "Well argued."}]"#)]);
    let quiz = sample_quiz(AgeRange::Middle);
    let submission = Submission::new(&quiz, answers(&[("open1", "Because he was brave.")]));

    let result = QuizGrader::new(resolver).grade(&submission).await;

    assert_eq!(result.total_score, 8);
    assert!(result.feedback[6].contains("Score: 8/10") && result.feedback[6].contains("Well argued."));
    assert!(!result.feedback_html().contains(SERVICE_ERROR));
}

#[test]
fn plain_text_lines_follow_the_fragments() {
    let quiz = sample_quiz(AgeRange::Early);
    let section = grade_mcqs(&quiz.mcqs, &answers(&[("mcq1", "b"), ("mcq2", "a")]));
    assert_eq!(section.lines.len(), section.fragments.len());
    assert_eq!(section.lines[0], "Question 1 (MCQ): Correct!");
    assert_eq!(section.lines[1], "Question 2 (MCQ): Incorrect. Correct is B.");
}
