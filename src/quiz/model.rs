//! Quiz data model shared by the server, the adapters and the client session.
//!
//! Wire names are camelCase so the JSON matches what browsers already send.

use crate::error::ValidationError;
use crate::json_utils::ReplyShape;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const MCQ_COUNT: usize = 6;
pub const OPEN_ENDED_COUNT: usize = 4;
pub const MCQ_POINTS: u32 = 1;
pub const OPEN_POINTS: u32 = 10;

/// One of the four fixed reader age bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum AgeRange {
    #[serde(rename = "5-7")]
    Early,
    #[serde(rename = "8-10")]
    Middle,
    #[serde(rename = "11-13")]
    Preteen,
    #[serde(rename = "14+")]
    Teen,
}

impl AgeRange {
    pub const ALL: [AgeRange; 4] = [AgeRange::Early, AgeRange::Middle, AgeRange::Preteen, AgeRange::Teen];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRange::Early => "5-7",
            AgeRange::Middle => "8-10",
            AgeRange::Preteen => "11-13",
            AgeRange::Teen => "14+",
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgeRange::ALL
            .into_iter()
            .find(|age| age.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown age range: '{}'. Supported: 5-7, 8-10, 11-13, 14+", s))
    }
}

/// Multiple-choice option letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [OptionLetter::A, OptionLetter::B, OptionLetter::C, OptionLetter::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionLetter::A => "a",
            OptionLetter::B => "b",
            OptionLetter::C => "c",
            OptionLetter::D => "d",
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionLetter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(OptionLetter::A),
            "b" => Ok(OptionLetter::B),
            "c" => Ok(OptionLetter::C),
            "d" => Ok(OptionLetter::D),
            other => Err(format!("'{}' is not an option letter", other)),
        }
    }
}

// Models sometimes answer "B"; accept any case on the way in.
impl<'de> Deserialize<'de> for OptionLetter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Mcq {
    pub question: String,
    pub options: BTreeMap<OptionLetter, String>,
    pub correct: OptionLetter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenEndedQuestion {
    pub question: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Questions as the generation model returns them for a known book or a generic quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizBody {
    pub mcqs: Vec<Mcq>,
    pub open_ended: Vec<OpenEndedQuestion>,
}

impl ReplyShape for QuizBody {
    fn check(&self) -> Result<(), String> {
        check_questions(&self.mcqs, &self.open_ended)
    }
}

/// Generic questions produced for an unrecognized title, with the notice naming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizContent {
    pub mcqs: Vec<Mcq>,
    pub open_ended: Vec<OpenEndedQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ReplyShape for QuizContent {
    fn check(&self) -> Result<(), String> {
        check_questions(&self.mcqs, &self.open_ended)
    }
}

impl From<QuizBody> for QuizContent {
    fn from(body: QuizBody) -> Self {
        Self { mcqs: body.mcqs, open_ended: body.open_ended, warning: None }
    }
}

fn check_questions(mcqs: &[Mcq], open_ended: &[OpenEndedQuestion]) -> Result<(), String> {
    if mcqs.len() != MCQ_COUNT {
        return Err(format!("expected {} MCQs, got {}", MCQ_COUNT, mcqs.len()));
    }
    if open_ended.len() != OPEN_ENDED_COUNT {
        return Err(format!(
            "expected {} open-ended questions, got {}",
            OPEN_ENDED_COUNT,
            open_ended.len()
        ));
    }
    for (i, mcq) in mcqs.iter().enumerate() {
        if mcq.options.len() != OptionLetter::ALL.len() {
            return Err(format!("MCQ {} has {} options instead of a-d", i + 1, mcq.options.len()));
        }
        if !mcq.options.contains_key(&mcq.correct) {
            return Err(format!("MCQ {} marks missing option '{}' as correct", i + 1, mcq.correct));
        }
        if mcq.question.trim().is_empty() {
            return Err(format!("MCQ {} has no question text", i + 1));
        }
    }
    if let Some(i) = open_ended.iter().position(|q| q.question.trim().is_empty()) {
        return Err(format!("open-ended question {} has no question text", i + 1));
    }
    Ok(())
}

/// Response body of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuiz {
    pub mcqs: Vec<Mcq>,
    pub open_ended: Vec<OpenEndedQuestion>,
    pub is_book_known: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A quiz as held by the client for the duration of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub mcqs: Vec<Mcq>,
    pub open_ended: Vec<OpenEndedQuestion>,
    pub age_range: AgeRange,
    pub is_book_known: bool,
}

impl Quiz {
    pub fn from_generated(generated: GeneratedQuiz, age_range: AgeRange) -> Self {
        Self {
            mcqs: generated.mcqs,
            open_ended: generated.open_ended,
            age_range,
            is_book_known: generated.is_book_known,
        }
    }

    /// Question number shown to the reader for the `index`-th open-ended question (0-based).
    pub fn open_question_number(&self, index: usize) -> usize {
        self.mcqs.len() + index + 1
    }
}

/// Form state of the input view. Unlike [`QuizRequest`] it may be incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizConfig {
    pub book: String,
    pub chapters: String,
    #[serde(with = "empty_as_none")]
    pub age_range: Option<AgeRange>,
    pub use_generic: bool,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            book: String::new(),
            chapters: "all".to_string(),
            age_range: None,
            use_generic: false,
        }
    }
}

impl QuizConfig {
    /// Check the form and normalize it into a request. Age range is checked first.
    pub fn validate(&self) -> Result<QuizRequest, ValidationError> {
        let age_range = self.age_range.ok_or(ValidationError::MissingAgeRange)?;
        let book = self.book.trim().to_string();
        if !self.use_generic && book.is_empty() {
            return Err(ValidationError::MissingBook);
        }
        let chapters = self.chapters.trim().to_lowercase();
        Ok(QuizRequest {
            book,
            chapters: if chapters.is_empty() { "all".to_string() } else { chapters },
            age_range,
            use_generic: self.use_generic,
        })
    }
}

/// A validated generation request: age range set, book present unless generic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub book: String,
    pub chapters: String,
    pub age_range: AgeRange,
    pub use_generic: bool,
}

impl QuizRequest {
    pub fn generic(age_range: AgeRange) -> Self {
        Self {
            book: String::new(),
            chapters: "all".to_string(),
            age_range,
            use_generic: true,
        }
    }

    pub fn for_book(book: impl Into<String>, chapters: impl Into<String>, age_range: AgeRange) -> Self {
        Self {
            book: book.into(),
            chapters: chapters.into(),
            age_range,
            use_generic: false,
        }
    }

    pub fn covers_all_chapters(&self) -> bool {
        self.chapters == "all"
    }
}

/// Submitted answers keyed `mcq{n}` / `open{n}` (both 1-based).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, String>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mcq_key(n: usize) -> String {
        format!("mcq{}", n)
    }

    pub fn open_key(n: usize) -> String {
        format!("open{}", n)
    }

    pub fn mcq(&self, n: usize) -> Option<&str> {
        self.get(&Self::mcq_key(n))
    }

    pub fn open(&self, n: usize) -> &str {
        self.get(&Self::open_key(n)).unwrap_or("")
    }

    pub fn set_mcq(&mut self, n: usize, letter: OptionLetter) {
        self.0.insert(Self::mcq_key(n), letter.as_str().to_string());
    }

    pub fn set_open(&mut self, n: usize, text: impl Into<String>) {
        self.0.insert(Self::open_key(n), text.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// True when no entry holds a non-blank value.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keep only entries that address a question of `quiz` with a usable value.
    pub fn restricted_to(&self, quiz: &Quiz) -> AnswerSet {
        let mut kept = AnswerSet::new();
        for n in 1..=quiz.mcqs.len() {
            if let Some(letter) = self.mcq(n).and_then(|v| v.parse::<OptionLetter>().ok()) {
                if quiz.mcqs[n - 1].options.contains_key(&letter) {
                    kept.set_mcq(n, letter);
                }
            }
        }
        for n in 1..=quiz.open_ended.len() {
            if let Some(text) = self.get(&Self::open_key(n)) {
                kept.set_open(n, text);
            }
        }
        kept
    }
}

impl FromIterator<(String, String)> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Request body of `POST /submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub mcqs: Vec<Mcq>,
    pub open_ended: Vec<OpenEndedQuestion>,
    #[serde(default)]
    pub answers: AnswerSet,
    pub age_range: AgeRange,
}

impl Submission {
    pub fn new(quiz: &Quiz, answers: AnswerSet) -> Self {
        Self {
            mcqs: quiz.mcqs.clone(),
            open_ended: quiz.open_ended.clone(),
            answers,
            age_range: quiz.age_range,
        }
    }
}

/// Response body of `POST /submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Concatenated HTML feedback fragments.
    pub feedback: String,
    /// The same feedback as plain text, one line per question.
    #[serde(default)]
    pub feedback_lines: Vec<String>,
    /// Display line, e.g. `Total Score: 30/46 (65%)`.
    pub score: String,
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: u32,
}

/// Browsers send `""` for an unselected age range.
mod empty_as_none {
    use super::AgeRange;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<AgeRange>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(|a| a.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<AgeRange>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
