//! Durable storage contract consumed by the ingestion pipeline.
//!
//! The store's internals are an external concern; the pipeline only relies
//! on the read/write contract below. [`JsonFileStore`] is the default
//! implementation, persisting to JSON files under a data directory.

mod json;

pub use json::JsonFileStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RecipeRecord;

/// Storage-related errors.
///
/// Persistence failures are never fatal to the pipeline; in-memory state
/// stays authoritative for the session and errors surface only in logs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while reading or writing store files
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

/// Durable snapshot of the identity ledger.
///
/// Pending search terms are deliberately absent: a search interrupted by
/// shutdown must be re-runnable next session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Every recipe id ever ingested, in first-seen order.
    #[serde(default)]
    pub retrieved_ids: Vec<String>,
    /// Every search-term combination fully fetched and committed.
    #[serde(default)]
    pub committed_terms: Vec<String>,
}

/// Read/write contract of the durable recipe store.
///
/// `upsert` stages changes in the store's working state; `commit` makes the
/// staged state durable. Scalar state (page cursor, ledger, per-recipe
/// favorite flags) is persisted alongside the records.
pub trait PersistentStore: Send + Sync {
    /// Returns every stored record in insertion order.
    fn fetch_all(&self) -> Result<Vec<RecipeRecord>, StoreError>;

    /// Inserts the record, or replaces the stored record with the same id.
    fn upsert(&self, record: &RecipeRecord) -> Result<(), StoreError>;

    /// Looks up one record by id.
    fn query_by_id(&self, id: &str) -> Result<Option<RecipeRecord>, StoreError>;

    /// Makes all staged changes durable.
    fn commit(&self) -> Result<(), StoreError>;

    /// The last-requested page of the unfiltered listing.
    fn page_cursor(&self) -> Result<u32, StoreError>;

    /// Persists the page cursor.
    fn set_page_cursor(&self, cursor: u32) -> Result<(), StoreError>;

    /// Loads the ledger snapshot; empty if never stored.
    fn load_ledger(&self) -> Result<LedgerSnapshot, StoreError>;

    /// Stages the ledger snapshot for the next commit.
    fn store_ledger(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError>;

    /// The persisted favorite flag for a recipe id, if any was ever set.
    fn favorite(&self, id: &str) -> Result<Option<bool>, StoreError>;

    /// Persists the favorite flag for a recipe id.
    fn set_favorite(&self, id: &str, favorite: bool) -> Result<(), StoreError>;
}
