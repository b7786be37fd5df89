//! Instruction strings for the completion service. Everything here is pure string
//! construction and cannot fail.

use crate::quiz::model::{AgeRange, QuizRequest, MCQ_COUNT, OPEN_ENDED_COUNT, OPEN_POINTS};

const MCQ_SHAPE: &str = r#""mcqs": [{"question": "str", "options": {"a": "str", "b": "str", "c": "str", "d": "str"}, "correct": "letter"} ...]"#;
const OPEN_SHAPE: &str = r#""openEnded": [{"question": "str", "keyPoints": ["point1", "point2", ...]} ...]"#;

/// Warning embedded in a generic quiz produced for an unrecognized title.
pub fn unknown_book_warning(book: &str) -> String {
    format!("Book '{}' not found, using generic questions.", book)
}

/// Ask whether `book` is a known published work.
pub fn book_check_prompt(book: &str) -> String {
    format!(
        r#"Is the book "{}" a known published book? Respond with JSON: {{"isKnown": boolean, "message": "string"}}"#,
        book
    )
}

/// Build the quiz-generation instruction.
///
/// `book_known` is ignored for generic requests. An unknown book yields the generic
/// instruction plus a `warning` field naming the title.
pub fn generation_prompt(request: &QuizRequest, book_known: bool) -> String {
    if request.use_generic {
        return generic_prompt(request.age_range, None);
    }
    if !book_known {
        return generic_prompt(request.age_range, Some(&request.book));
    }

    let scope = if request.covers_all_chapters() {
        "all chapters".to_string()
    } else {
        format!("chapters {}", request.chapters)
    };
    format!(
        "Generate a quiz for the book \"{book}\" covering {scope}, suitable for age range {age}.\n\
         - Create {mcqs} multiple-choice questions (MCQs). Each MCQ should have a question, 4 options (a, b, c, d), and specify the correct answer letter.\n\
         - Create {open} open-ended questions for written responses. For each, provide the question and a list of key points for evaluation.\n\
         - Adjust difficulty and language to be appropriate for the age range.\n\
         {shape}",
        book = request.book,
        scope = scope,
        age = request.age_range,
        mcqs = MCQ_COUNT,
        open = OPEN_ENDED_COUNT,
        shape = shape_directive(None),
    )
}

fn generic_prompt(age_range: AgeRange, unknown_book: Option<&str>) -> String {
    let preamble = match unknown_book {
        Some(book) => format!("The book \"{}\" was not found. ", book),
        None => String::new(),
    };
    format!(
        "{preamble}Generate a generic literature quiz suitable for age range {age}, not tied to a specific book.\n\
         - Create {mcqs} multiple-choice questions (MCQs) about general reading comprehension, literary themes, or story elements (e.g., plot, characters, setting, themes).\n\
         - Each MCQ should have a question, 4 options (a, b, c, d), and specify the correct answer letter.\n\
         - Create {open} open-ended questions for written responses about general literature concepts (e.g., analyzing themes, character motivations).\n\
         - For each open-ended question, provide the question and a list of key points for evaluation.\n\
         - Adjust difficulty and language to be appropriate for the age range.\n\
         {shape}",
        preamble = preamble,
        age = age_range,
        mcqs = MCQ_COUNT,
        open = OPEN_ENDED_COUNT,
        shape = shape_directive(unknown_book.map(unknown_book_warning).as_deref()),
    )
}

fn shape_directive(warning: Option<&str>) -> String {
    let mut fields = vec![format!("  {}", MCQ_SHAPE), format!("  {}", OPEN_SHAPE)];
    if let Some(warning) = warning {
        fields.push(format!("  \"warning\": \"{}\"", warning.replace('"', "\\\"")));
    }
    format!("- Respond ONLY in JSON format: {{\n{}\n}}", fields.join(",\n"))
}

/// One answered open-ended question handed to the grader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingItem<'a> {
    /// Question number as displayed, counting the MCQs first.
    pub q_num: usize,
    pub question: &'a str,
    pub key_points: &'a [String],
    pub response: &'a str,
}

/// Build the single batch instruction that grades every answered open-ended question.
pub fn grading_prompt(items: &[GradingItem<'_>], age_range: AgeRange) -> String {
    let sections: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "\nEvaluate the student's response to: \"{question}\" for age range {age}.\n\
                 Key points to cover: {points}.\n\
                 Student response: \"{response}\"\n\
                 Score out of {max} (considering age-appropriate understanding, completeness, and accuracy). Provide brief feedback.\n\
                 Return result as: {{\"qNum\": {q_num}, \"score\": number, \"feedback\": \"string\"}}\n",
                question = item.question,
                age = age_range,
                points = item.key_points.join(", "),
                response = item.response.trim(),
                max = OPEN_POINTS,
                q_num = item.q_num,
            )
        })
        .collect();

    format!(
        "Evaluate the following responses:\n{}\nRespond with JSON array: [{{qNum, score, feedback}}, ...]",
        sections.join("\n")
    )
}
