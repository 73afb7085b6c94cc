//! Client for the recipe search and detail endpoints.

use tracing::{debug, warn};

use crate::config::RecipeApiConfig;
use crate::http::HttpClient;
use crate::model::RecipeRecord;

use super::types::{ApiError, ApiSortOption, DetailResponse, RecipeDto, SearchResponse};

/// Client for the remote recipe API.
///
/// Generic over the HTTP transport so tests can script responses.
pub struct RecipeApi<C: HttpClient> {
    http: C,
    config: RecipeApiConfig,
}

impl<C: HttpClient> RecipeApi<C> {
    /// Creates a new API client.
    pub fn new(http: C, config: RecipeApiConfig) -> Self {
        Self { http, config }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &RecipeApiConfig {
        &self.config
    }

    /// Fetches one page of search results.
    ///
    /// # Arguments
    ///
    /// * `terms` - Search words, joined by commas on the wire; `None` for
    ///   the unfiltered listing
    /// * `sort` - Server-side sort order
    /// * `page` - 1-based page number; `None` lets the server default
    ///
    /// # Returns
    ///
    /// The decoded records of the page. Individual records that fail to
    /// decode are dropped with a warning; an empty page is a valid result.
    pub async fn search(
        &self,
        terms: Option<&[String]>,
        sort: ApiSortOption,
        page: Option<u32>,
    ) -> Result<Vec<RecipeRecord>, ApiError> {
        let url = self.search_url(terms, sort, page);
        let body = self.http.get(&url).await?;

        let response: SearchResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Malformed(format!("search response: {e}")))?;

        let mut records = Vec::with_capacity(response.recipes.len());
        for value in response.recipes {
            match serde_json::from_value::<RecipeDto>(value) {
                Ok(dto) => records.push(RecipeRecord::from(dto)),
                Err(e) => warn!(error = %e, "Dropping malformed recipe in search page"),
            }
        }

        debug!(
            page = page.unwrap_or(1),
            count = records.len(),
            "Search page decoded"
        );

        Ok(records)
    }

    /// Fetches the full detail of a single recipe by id.
    pub async fn details(&self, id: &str) -> Result<RecipeRecord, ApiError> {
        let url = format!(
            "{}?key={}&rId={}",
            self.config.detail_base, self.config.api_key, id
        );
        let body = self.http.get(&url).await?;

        let response: DetailResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Malformed(format!("detail response: {e}")))?;

        let dto: RecipeDto = serde_json::from_value(response.recipe)
            .map_err(|e| ApiError::Malformed(format!("detail recipe: {e}")))?;

        Ok(RecipeRecord::from(dto))
    }

    fn search_url(&self, terms: Option<&[String]>, sort: ApiSortOption, page: Option<u32>) -> String {
        let mut url = format!(
            "{}?key={}&sort={}",
            self.config.search_base,
            self.config.api_key,
            sort.key()
        );
        if let Some(terms) = terms {
            if !terms.is_empty() {
                url.push_str("&q=");
                url.push_str(&terms.join(","));
            }
        }
        if let Some(page) = page {
            url.push_str(&format!("&page={page}"));
        }
        url
    }
}
