use crate::core::{LowLevelClient, QueryResolver};
use crate::error::{GenerationError, QueryResolverError};
use crate::json_utils::ReplyShape;
use crate::quiz::model::{GeneratedQuiz, QuizBody, QuizContent, QuizRequest};
use crate::quiz::prompt::{book_check_prompt, generation_prompt, unknown_book_warning};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Reply to the "is this a published book?" check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookCheck {
    pub is_known: bool,
    #[serde(default)]
    pub message: String,
}

impl ReplyShape for BookCheck {}

/// Creates quiz content through the completion service.
#[derive(Clone)]
pub struct QuizGenerator<C: LowLevelClient> {
    resolver: QueryResolver<C>,
}

impl<C: LowLevelClient> QuizGenerator<C> {
    pub fn new(resolver: QueryResolver<C>) -> Self {
        Self { resolver }
    }

    /// One completion call. A reply that does not decode as `{isKnown, message}` is an error.
    #[instrument(target = "book_quiz::generation", skip(self))]
    pub async fn check_book_known(&self, book: &str) -> Result<BookCheck, QueryResolverError> {
        let check: BookCheck = self.resolver.query(book_check_prompt(book)).await?;
        info!(is_known = check.is_known, message = %check.message, "Book check finished");
        Ok(check)
    }

    /// Generate a quiz for `request`: check the title unless generic, then one
    /// generation call. No retries.
    #[instrument(
        target = "book_quiz::generation",
        skip(self, request),
        fields(book = %request.book, age = %request.age_range, generic = request.use_generic)
    )]
    pub async fn generate_quiz(&self, request: &QuizRequest) -> Result<GeneratedQuiz, GenerationError> {
        let is_book_known = if request.use_generic {
            true
        } else {
            self.check_book_known(&request.book)
                .await
                .map_err(GenerationError::BookCheck)?
                .is_known
        };

        // Only the unknown-title reply carries a warning field.
        let unknown_title = !request.use_generic && !is_book_known;
        let prompt = generation_prompt(request, is_book_known);
        let content = if unknown_title {
            self.resolver.query::<QuizContent>(prompt).await
        } else {
            self.resolver.query::<QuizBody>(prompt).await.map(QuizContent::from)
        }
        .map_err(|e| {
            warn!(error = %e, "Quiz content generation failed");
            GenerationError::Content(e)
        })?;

        let warning = if unknown_title {
            Some(
                content
                    .warning
                    .filter(|w| w.contains(&request.book))
                    .unwrap_or_else(|| unknown_book_warning(&request.book)),
            )
        } else {
            None
        };

        info!(
            mcqs = content.mcqs.len(),
            open_ended = content.open_ended.len(),
            is_book_known,
            "Quiz generated"
        );
        Ok(GeneratedQuiz {
            mcqs: content.mcqs,
            open_ended: content.open_ended,
            is_book_known,
            warning,
        })
    }
}
