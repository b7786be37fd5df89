use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryResolverError {
    #[error("AI error: {0}")]
    Ai(#[from] AIError),
    #[error("Reply decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum AIError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Mock client error: {0}")]
    Mock(String),
}

#[derive(Error, Debug)]
pub enum OpenAIError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Authentication failed")]
    Authentication,
}

/// Named failures of the schema-checked decode applied to every model reply.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no JSON found in reply. Raw response: {raw}")]
    NoJson { raw: String },
    #[error("JSON did not match the expected shape: {source}. Raw response: {raw}")]
    Shape {
        #[source]
        source: serde_json::Error,
        raw: String,
    },
    #[error("reply failed validation: {reason}. Raw response: {raw}")]
    Invalid { reason: String, raw: String },
}

/// Client-side input problems that block a generation request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select an age range.")]
    MissingAgeRange,
    #[error("Please enter a book name or select generic questions.")]
    MissingBook,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("book lookup failed: {0}")]
    BookCheck(#[source] QueryResolverError),
    #[error("quiz content generation failed: {0}")]
    Content(#[source] QueryResolverError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    WrongPhase { action: &'static str, phase: String },
    #[error("No quiz generated.")]
    NoQuiz,
    #[error("no question {0} in this quiz")]
    UnknownQuestion(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
