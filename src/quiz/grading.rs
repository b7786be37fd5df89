//! Scoring of a submitted quiz.
//!
//! MCQs are graded locally by literal letter comparison. Answered open-ended
//! questions go to the completion service in one batch; anything the service
//! fails to score degrades to zero with an inline explanation.

use crate::core::{LowLevelClient, QueryResolver};
use crate::quiz::model::{
    AgeRange, AnswerSet, Mcq, OpenEndedQuestion, Submission, SubmitResponse, MCQ_POINTS, OPEN_POINTS,
};
use crate::quiz::prompt::{grading_prompt, GradingItem};
use askama::Template;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};

pub const NO_RESPONSE: &str = "No response provided.";
pub const EVALUATION_ERROR: &str = "Error evaluating response.";
pub const SERVICE_ERROR: &str = "Error evaluating response. The grading service did not return a usable result.";

/// One entry of the batch grading reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpenEndedEvaluation {
    #[serde(rename = "qNum", deserialize_with = "whole_number")]
    pub q_num: usize,
    /// Expected 0 to 10.
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
}

// Models sometimes write question numbers as `7.0`.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw >= 0.0 && raw.fract() == 0.0 && raw <= u32::MAX as f64 {
        Ok(raw as usize)
    } else {
        Err(serde::de::Error::custom(format!("qNum must be a whole number, got {}", raw)))
    }
}

/// Points and feedback for one section of the quiz. `fragments` holds HTML and
/// `lines` the same feedback as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionScore {
    pub points: u32,
    pub max_points: u32,
    pub fragments: Vec<String>,
    pub lines: Vec<String>,
}

impl SectionScore {
    fn push(&mut self, fragment: &impl Template, line: String) {
        self.fragments.push(render(fragment));
        self.lines.push(line);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingResult {
    pub feedback: Vec<String>,
    pub lines: Vec<String>,
    pub total_score: u32,
    pub max_score: u32,
}

impl GradingResult {
    pub fn from_sections(sections: impl IntoIterator<Item = SectionScore>) -> Self {
        let mut result = GradingResult { feedback: Vec::new(), lines: Vec::new(), total_score: 0, max_score: 0 };
        for section in sections {
            result.total_score += section.points;
            result.max_score += section.max_points;
            result.feedback.extend(section.fragments);
            result.lines.extend(section.lines);
        }
        result
    }

    /// Whole-number percentage, rounded half away from zero.
    pub fn percentage(&self) -> u32 {
        if self.max_score == 0 {
            return 0;
        }
        (f64::from(self.total_score) * 100.0 / f64::from(self.max_score)).round() as u32
    }

    pub fn feedback_html(&self) -> String {
        self.feedback.concat()
    }

    pub fn score_line(&self) -> String {
        format!("Total Score: {}/{} ({}%)", self.total_score, self.max_score, self.percentage())
    }

    pub fn to_response(&self) -> SubmitResponse {
        SubmitResponse {
            feedback: self.feedback_html(),
            feedback_lines: self.lines.clone(),
            score: self.score_line(),
            total_score: self.total_score,
            max_score: self.max_score,
            percentage: self.percentage(),
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"{% if correct %}<p class="correct animate__animated animate__bounceIn">Question {{ q_num }} (MCQ): Correct!</p>{% else %}<p class="incorrect animate__animated animate__shakeX">Question {{ q_num }} (MCQ): Incorrect. Correct is {{ answer }}.</p>{% endif %}"#,
    ext = "html"
)]
struct McqFeedback {
    q_num: usize,
    correct: bool,
    answer: String,
}

impl McqFeedback {
    fn line(&self) -> String {
        if self.correct {
            format!("Question {} (MCQ): Correct!", self.q_num)
        } else {
            format!("Question {} (MCQ): Incorrect. Correct is {}.", self.q_num, self.answer)
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<p>Question {{ q_num }} (Open): <span class="{% if passed %}correct{% else %}incorrect{% endif %}">Score: {{ score }}/{{ max }}</span></p><div class="feedback animate__animated animate__fadeIn">{{ feedback }}</div>"#,
    ext = "html"
)]
struct OpenFeedback<'a> {
    q_num: usize,
    passed: bool,
    score: u32,
    max: u32,
    feedback: &'a str,
}

impl<'a> OpenFeedback<'a> {
    fn new(q_num: usize, score: u32, feedback: &'a str) -> Self {
        Self { q_num, passed: score >= OPEN_POINTS / 2, score, max: OPEN_POINTS, feedback }
    }

    fn line(&self) -> String {
        format!("Question {} (Open): Score: {}/{}. {}", self.q_num, self.score, self.max, self.feedback)
    }
}

fn render(template: &impl Template) -> String {
    template.render().unwrap_or_else(|e| {
        error!(error = %e, "Failed to render feedback fragment");
        String::new()
    })
}

fn push_open(section: &mut SectionScore, q_num: usize, score: u32, feedback: &str) {
    let fragment = OpenFeedback::new(q_num, score, feedback);
    section.push(&fragment, fragment.line());
}

/// Grade MCQs: one point iff the submitted value equals the correct letter.
pub fn grade_mcqs(mcqs: &[Mcq], answers: &AnswerSet) -> SectionScore {
    let mut section = SectionScore { max_points: mcqs.len() as u32 * MCQ_POINTS, ..SectionScore::default() };
    for (index, mcq) in mcqs.iter().enumerate() {
        let correct = answers.mcq(index + 1) == Some(mcq.correct.as_str());
        if correct {
            section.points += MCQ_POINTS;
        }
        let fragment = McqFeedback {
            q_num: index + 1,
            correct,
            answer: mcq.correct.as_str().to_uppercase(),
        };
        section.push(&fragment, fragment.line());
    }
    section
}

/// Round and bound a model-supplied score to `0..=OPEN_POINTS`.
pub fn clamp_score(raw: f64) -> u32 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, f64::from(OPEN_POINTS)) as u32
}

/// Grades submissions: MCQs locally, open-ended answers through the completion service.
#[derive(Clone)]
pub struct QuizGrader<C: LowLevelClient> {
    resolver: QueryResolver<C>,
}

impl<C: LowLevelClient> QuizGrader<C> {
    pub fn new(resolver: QueryResolver<C>) -> Self {
        Self { resolver }
    }

    #[instrument(target = "book_quiz::grading", skip_all, fields(mcqs = submission.mcqs.len(), open_ended = submission.open_ended.len()))]
    pub async fn grade(&self, submission: &Submission) -> GradingResult {
        let mcq_section = grade_mcqs(&submission.mcqs, &submission.answers);
        let open_section = self
            .grade_open_ended(
                submission.mcqs.len(),
                &submission.open_ended,
                &submission.answers,
                submission.age_range,
            )
            .await;
        let result = GradingResult::from_sections([mcq_section, open_section]);
        info!(total = result.total_score, max = result.max_score, "Submission graded");
        result
    }

    /// Score open-ended answers. Blank answers never reach the service; one call
    /// covers the rest. Results are matched back by question number, which
    /// continues after the `mcq_count` MCQs.
    pub async fn grade_open_ended(
        &self,
        mcq_count: usize,
        open_ended: &[OpenEndedQuestion],
        answers: &AnswerSet,
        age_range: AgeRange,
    ) -> SectionScore {
        let items: Vec<GradingItem<'_>> = open_ended
            .iter()
            .enumerate()
            .filter(|(i, _)| !answers.open(i + 1).trim().is_empty())
            .map(|(i, question)| GradingItem {
                q_num: mcq_count + i + 1,
                question: &question.question,
                key_points: &question.key_points,
                response: answers.open(i + 1),
            })
            .collect();

        let evaluations: Option<HashMap<usize, OpenEndedEvaluation>> = if items.is_empty() {
            Some(HashMap::new())
        } else {
            match self
                .resolver
                .query_all::<OpenEndedEvaluation>(grading_prompt(&items, age_range))
                .await
            {
                Ok(found) => {
                    // First entry wins when the model repeats a question number.
                    let mut by_number = HashMap::new();
                    for evaluation in found {
                        by_number.entry(evaluation.q_num).or_insert(evaluation);
                    }
                    Some(by_number)
                }
                Err(e) => {
                    warn!(error = %e, answered = items.len(), "Batch evaluation failed");
                    None
                }
            }
        };

        let mut section = SectionScore {
            max_points: open_ended.len() as u32 * OPEN_POINTS,
            ..SectionScore::default()
        };
        for index in 0..open_ended.len() {
            let q_num = mcq_count + index + 1;
            if answers.open(index + 1).trim().is_empty() {
                push_open(&mut section, q_num, 0, NO_RESPONSE);
                continue;
            }
            let Some(evaluations) = &evaluations else {
                push_open(&mut section, q_num, 0, SERVICE_ERROR);
                continue;
            };
            match evaluations.get(&q_num) {
                Some(evaluation) => {
                    let score = clamp_score(evaluation.score);
                    if f64::from(score) != evaluation.score {
                        warn!(q_num, raw = evaluation.score, score, "Adjusted out-of-range score");
                    }
                    section.points += score;
                    push_open(&mut section, q_num, score, &evaluation.feedback);
                }
                None => {
                    warn!(q_num, "No evaluation returned for question");
                    push_open(&mut section, q_num, 0, EVALUATION_ERROR);
                }
            }
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds_and_rounds() {
        assert_eq!(clamp_score(7.0), 7);
        assert_eq!(clamp_score(7.5), 8);
        assert_eq!(clamp_score(12.0), 10);
        assert_eq!(clamp_score(-3.0), 0);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn percentage_rounds_half_up() {
        let result = GradingResult { feedback: vec![], lines: vec![], total_score: 23, max_score: 46 };
        assert_eq!(result.percentage(), 50);
        let result = GradingResult { feedback: vec![], lines: vec![], total_score: 1, max_score: 46 };
        assert_eq!(result.percentage(), 2);
        assert_eq!(result.score_line(), "Total Score: 1/46 (2%)");
    }

    #[test]
    fn open_fragment_marks_passing_scores() {
        assert!(render(&OpenFeedback::new(7, 5, "ok")).contains("class=\"correct\""));
        assert!(render(&OpenFeedback::new(7, 4, "meh")).contains("class=\"incorrect\""));
        assert!(render(&OpenFeedback::new(8, 0, NO_RESPONSE)).contains("Question 8 (Open)"));
    }

    #[test]
    fn feedback_is_escaped_in_html_only() {
        let fragment = OpenFeedback::new(7, 6, "<b>Tom & Huck</b>");
        assert!(render(&fragment).contains("&lt;b&gt;Tom &amp; Huck"));
        assert!(!render(&fragment).contains("<b>"));
        assert_eq!(fragment.line(), "Question 7 (Open): Score: 6/10. <b>Tom & Huck</b>");
    }

    #[test]
    fn question_numbers_accept_integral_floats() {
        let evaluation: OpenEndedEvaluation =
            serde_json::from_str(r#"{"qNum": 7.0, "score": 8, "feedback": "Good."}"#).unwrap();
        assert_eq!(evaluation.q_num, 7);
        assert!(serde_json::from_str::<OpenEndedEvaluation>(r#"{"qNum": 7.5, "score": 8}"#).is_err());
        assert!(serde_json::from_str::<OpenEndedEvaluation>(r#"{"qNum": -1, "score": 8}"#).is_err());
    }
}
