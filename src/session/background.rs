//! Background image for the quiz and results views: the book's cover from
//! Open Library when one exists, an age-themed picture otherwise.

use crate::quiz::model::{AgeRange, QuizRequest};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub const COVERS_BASE_URL: &str = "https://covers.openlibrary.org/b/title/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    Cover,
    Fallback,
}

/// Background reference persisted next to the quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    #[serde(rename = "backgroundUrl")]
    pub url: String,
    #[serde(rename = "backgroundType")]
    pub kind: BackgroundKind,
    #[serde(rename = "backgroundWarning", default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Background {
    pub fn fallback(age_range: AgeRange, warning: Option<String>) -> Self {
        Self {
            url: age_background(age_range).to_string(),
            kind: BackgroundKind::Fallback,
            warning,
        }
    }
}

pub fn age_background(age_range: AgeRange) -> &'static str {
    match age_range {
        AgeRange::Early => "https://source.unsplash.com/800x600/?books,children",
        AgeRange::Middle => "https://source.unsplash.com/800x600/?adventure,books",
        AgeRange::Preteen => "https://source.unsplash.com/800x600/?literature,teen",
        AgeRange::Teen => "https://source.unsplash.com/800x600/?literature,classic",
    }
}

pub fn missing_cover_warning(book: &str) -> String {
    format!("Book cover not found for \"{}\", using generic background.", book)
}

/// Picks a background for a request. Never fails: every problem becomes a fallback.
#[async_trait]
pub trait BackgroundSource: Send + Sync {
    async fn background_for(&self, request: &QuizRequest) -> Background;
}

/// Looks up covers on Open Library.
#[derive(Debug, Clone)]
pub struct CoverFinder {
    http: reqwest::Client,
    base_url: String,
}

impl Default for CoverFinder {
    fn default() -> Self {
        Self::new(COVERS_BASE_URL)
    }
}

impl CoverFinder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Cover URL for `book`: whitespace runs become `+`, then the segment is percent-encoded.
    /// `default=false` makes the service answer 404 instead of a blank image.
    pub fn cover_url(&self, book: &str) -> Option<Url> {
        let title = book.split_whitespace().collect::<Vec<_>>().join("+");
        if title.is_empty() {
            return None;
        }
        let mut url = Url::parse(&self.base_url).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(&format!("{}-M.jpg", title));
        url.query_pairs_mut().append_pair("default", "false");
        Some(url)
    }

    async fn fetch_cover(&self, url: Url) -> Result<bool, reqwest::Error> {
        let response = self.http.get(url).send().await?;
        let is_image = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("image"));
        Ok(response.status().is_success() && is_image)
    }
}

#[async_trait]
impl BackgroundSource for CoverFinder {
    #[instrument(target = "book_quiz::background", skip(self, request), fields(book = %request.book))]
    async fn background_for(&self, request: &QuizRequest) -> Background {
        if request.use_generic {
            return Background::fallback(request.age_range, None);
        }
        let missing = || Background::fallback(request.age_range, Some(missing_cover_warning(&request.book)));

        let Some(url) = self.cover_url(&request.book) else {
            return missing();
        };
        match self.fetch_cover(url.clone()).await {
            Ok(true) => {
                debug!(%url, "Found cover");
                Background {
                    url: url.to_string(),
                    kind: BackgroundKind::Cover,
                    warning: None,
                }
            }
            Ok(false) => missing(),
            Err(e) => {
                warn!(error = %e, "Cover lookup failed");
                missing()
            }
        }
    }
}

/// Always the age background; for offline use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeBackgrounds;

#[async_trait]
impl BackgroundSource for AgeBackgrounds {
    async fn background_for(&self, request: &QuizRequest) -> Background {
        Background::fallback(request.age_range, None)
    }
}
