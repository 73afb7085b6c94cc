//! Configuration for the recipe API, the image pipeline, and the store.

use std::path::PathBuf;

/// Default number of recipes requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Default maximum page fetched by a term search before giving up.
pub const DEFAULT_MAX_SEARCH_PAGE: u32 = 4;

/// Default minimum number of ingested recipes before non-forced
/// `load_more` calls become no-ops.
pub const DEFAULT_PREFERRED_MINIMUM_RECIPES: usize = 60;

/// Remote recipe API configuration.
#[derive(Debug, Clone)]
pub struct RecipeApiConfig {
    /// Base URL of the paginated search endpoint.
    pub search_base: String,
    /// Base URL of the single-recipe detail endpoint.
    pub detail_base: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Number of recipes per search page.
    pub page_size: u32,
    /// Highest page a term search will fetch.
    pub max_search_page: u32,
    /// Non-forced `load_more` stops once this many recipes are ingested.
    pub preferred_minimum_recipes: usize,
}

impl Default for RecipeApiConfig {
    fn default() -> Self {
        Self {
            search_base: "https://food2fork.com/api/search".to_string(),
            detail_base: "https://food2fork.com/api/get".to_string(),
            api_key: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_search_page: DEFAULT_MAX_SEARCH_PAGE,
            preferred_minimum_recipes: DEFAULT_PREFERRED_MINIMUM_RECIPES,
        }
    }
}

impl RecipeApiConfig {
    /// Create a configuration with the given API key and default endpoints.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Override the search and detail endpoint bases.
    ///
    /// Used by tests to point the pipeline at a scripted transport.
    pub fn with_endpoints(
        mut self,
        search_base: impl Into<String>,
        detail_base: impl Into<String>,
    ) -> Self {
        self.search_base = search_base.into();
        self.detail_base = detail_base.into();
        self
    }

    /// Override the maximum search page.
    pub fn with_max_search_page(mut self, page: u32) -> Self {
        self.max_search_page = page;
        self
    }
}

/// Image pipeline configuration.
#[derive(Debug, Clone)]
pub struct ImagePipelineConfig {
    /// Maximum number of downloads in flight at once.
    pub max_concurrent_downloads: usize,
    /// Transient fetch failures tolerated before a job is dropped for good.
    pub max_retries: u32,
    /// Memory cache bound in bytes.
    pub memory_cache_bytes: usize,
    /// Directory holding the disk cache files.
    pub cache_dir: PathBuf,
    /// Base URL of the favicon service; the target domain is appended.
    pub favicon_base: String,
}

impl Default for ImagePipelineConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recipestream")
            .join("images");

        Self {
            max_concurrent_downloads: 5,
            max_retries: 1,
            memory_cache_bytes: 256 * 1024 * 1024, // 256 MB
            cache_dir,
            favicon_base: "https://logo.clearbit.com/".to_string(),
        }
    }
}

impl ImagePipelineConfig {
    /// Set the disk cache directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Set the concurrent download bound.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    /// Set the transient-failure retry bound.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the memory cache bound in bytes.
    pub fn with_memory_bytes(mut self, bytes: usize) -> Self {
        self.memory_cache_bytes = bytes;
        self
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the store files.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recipestream");

        Self { data_dir }
    }
}

impl StoreConfig {
    /// Create a configuration rooted at the given directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_defaults() {
        let config = RecipeApiConfig::default();
        assert_eq!(config.page_size, 30);
        assert_eq!(config.max_search_page, 4);
        assert!(config.search_base.ends_with("/search"));
        assert!(config.detail_base.ends_with("/get"));
    }

    #[test]
    fn test_api_config_builder() {
        let config = RecipeApiConfig::new("secret")
            .with_endpoints("http://localhost/search", "http://localhost/get")
            .with_max_search_page(2);

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.search_base, "http://localhost/search");
        assert_eq!(config.detail_base, "http://localhost/get");
        assert_eq!(config.max_search_page, 2);
    }

    #[test]
    fn test_image_config_defaults() {
        let config = ImagePipelineConfig::default();
        assert_eq!(config.max_concurrent_downloads, 5);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.memory_cache_bytes, 256 * 1024 * 1024);
        assert!(config.cache_dir.ends_with("images"));
    }

    #[test]
    fn test_image_config_builder() {
        let config = ImagePipelineConfig::default()
            .with_cache_dir(PathBuf::from("/tmp/imgs"))
            .with_max_concurrent(3)
            .with_max_retries(2)
            .with_memory_bytes(1024);

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/imgs"));
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.memory_cache_bytes, 1024);
    }

    #[test]
    fn test_store_config_default_dir() {
        let config = StoreConfig::default();
        assert!(config.data_dir.ends_with("recipestream"));
    }
}
