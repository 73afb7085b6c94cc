//! Wire types for the recipe API.
//!
//! These are our own types, decoupled from the transport. Only the fields
//! the pipeline consumes are deserialized; unknown fields are ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::model::RecipeRecord;

/// Errors produced while talking to the recipe API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP transport failed or returned a non-success status.
    #[error("request failed: {0}")]
    Http(#[from] crate::http::FetchError),

    /// The response body was not the expected JSON shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Server-side sort order for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiSortOption {
    /// Sort by rating.
    #[default]
    Rating,
    /// Sort by trend score.
    TrendScore,
}

impl ApiSortOption {
    /// The query-parameter value the API expects.
    pub fn key(self) -> &'static str {
        match self {
            Self::Rating => "r",
            Self::TrendScore => "t",
        }
    }
}

/// Envelope of the search endpoint.
///
/// Individual entries are kept as raw values so one malformed record does
/// not discard the rest of the page.
#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub recipes: Vec<serde_json::Value>,
}

/// Envelope of the single-recipe detail endpoint.
#[derive(Deserialize)]
pub(crate) struct DetailResponse {
    pub recipe: serde_json::Value,
}

/// A recipe as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct RecipeDto {
    #[serde(rename = "rId")]
    pub id: String,
    pub title: String,
    pub publisher: String,
    #[serde(rename = "f2f_url")]
    pub food2fork_url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub publisher_url: Option<String>,
    #[serde(default)]
    pub social_rank: Option<f64>,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
}

impl From<RecipeDto> for RecipeRecord {
    fn from(dto: RecipeDto) -> Self {
        Self {
            id: dto.id,
            title: clean_text(&dto.title),
            publisher: dto.publisher,
            publisher_url: dto.publisher_url,
            source_url: dto.source_url,
            image_url: dto.image_url,
            food2fork_url: dto.food2fork_url,
            social_rank: dto.social_rank,
            ingredients: dto.ingredients.unwrap_or_default(),
            is_favorite: false,
            completed_ingredients: Default::default(),
        }
    }
}

/// Undo the most common HTML entity artifacts the aggregator leaves in
/// titles, and drop a leading `www.`.
pub(crate) fn clean_text(text: &str) -> String {
    text.replace("&#8217;", "'")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("www.", "")
}
