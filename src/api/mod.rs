//! Remote recipe API access.
//!
//! [`RecipeApi`] speaks the aggregator's search and detail endpoints over an
//! injected [`crate::http::HttpClient`], decoding wire JSON into
//! [`crate::model::RecipeRecord`]s. Malformed individual records are dropped
//! with a warning rather than failing the whole page.

mod client;
mod types;

pub use client::RecipeApi;
pub use types::{ApiError, ApiSortOption};
