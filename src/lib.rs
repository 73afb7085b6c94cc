//! RecipeStream - data-flow core for a recipe browsing application.
//!
//! This library provides the two pipelines behind a recipe app backed by a
//! remote recipe-search API:
//!
//! - an **image acquisition pipeline**: a bounded-concurrency download
//!   scheduler in front of a two-tier (memory + disk) cache, with duplicate
//!   requests for the same URL coalesced into a single fetch
//! - a **recipe ingestion pipeline**: paginated remote search, de-duplicated
//!   against a durable identity ledger and merged into a locally persisted
//!   collection without clobbering user-owned state (favorites, completed
//!   ingredients)
//!
//! # High-Level API
//!
//! ```ignore
//! use recipestream::config::{ImagePipelineConfig, RecipeApiConfig, StoreConfig};
//! use recipestream::http::PooledClient;
//! use recipestream::image::ImageService;
//! use recipestream::ingest::RecipeIngestionPipeline;
//! use recipestream::store::JsonFileStore;
//!
//! let http = PooledClient::new()?;
//! let images = ImageService::new(
//!     http.clone(),
//!     ImagePipelineConfig::default(),
//!     tokio::runtime::Handle::current(),
//! )?;
//! let store = JsonFileStore::open(StoreConfig::default())?;
//! let pipeline = RecipeIngestionPipeline::new(http, RecipeApiConfig::default(), store);
//!
//! pipeline.initial_load().await;
//! let image = images.fetch("https://example.com/pie.jpg", None, None);
//! ```

pub mod api;
pub mod config;
pub mod http;
pub mod image;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod store;

/// Version of the RecipeStream library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
