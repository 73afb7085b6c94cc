//! Orchestration of remote search, de-duplication and persistence.
//!
//! All collection state lives behind one async mutex; network fetches run
//! outside it so readers are never blocked on the wire. Pagination is
//! strictly sequential: page N+1 is requested only after page N's results
//! have been merged.
//!
//! Failures degrade, never propagate: a failed page is skipped, a failed
//! store write leaves the in-memory collection authoritative for the
//! session, and callers always get a value or an absence - diagnostics go
//! to the log.

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::api::{ApiSortOption, RecipeApi};
use crate::config::RecipeApiConfig;
use crate::http::HttpClient;
use crate::model::RecipeRecord;
use crate::store::PersistentStore;

use super::ledger::IdentityLedger;
use super::IngestEvent;

/// Capacity of the event fan-out channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

struct IngestState {
    recipes: Vec<RecipeRecord>,
    ledger: IdentityLedger,
}

/// The ingestion pipeline: remote search in, persisted collection out.
pub struct RecipeIngestionPipeline<C: HttpClient, S: PersistentStore> {
    api: RecipeApi<C>,
    store: S,
    state: Mutex<IngestState>,
    events: broadcast::Sender<IngestEvent>,
}

impl<C: HttpClient, S: PersistentStore> RecipeIngestionPipeline<C, S> {
    /// Creates a pipeline over the given transport and store.
    ///
    /// Nothing is loaded until [`initial_load`](Self::initial_load) runs.
    pub fn new(http: C, config: RecipeApiConfig, store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api: RecipeApi::new(http, config),
            store,
            state: Mutex::new(IngestState {
                recipes: Vec::new(),
                ledger: IdentityLedger::new(),
            }),
            events,
        }
    }

    /// Subscribes to pipeline progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.events.subscribe()
    }

    /// Loads the persisted collection, restoring the ledger and favorite
    /// flags. If the store is empty, fetches one unfiltered search page
    /// and commits it.
    ///
    /// Returns the number of records in the collection afterwards.
    pub async fn initial_load(&self) -> usize {
        let loaded = {
            let mut state = self.state.lock().await;

            state.ledger = match self.store.load_ledger() {
                Ok(snapshot) => IdentityLedger::restore(snapshot),
                Err(e) => {
                    warn!(error = %e, "Ledger load failed, starting empty");
                    IdentityLedger::new()
                }
            };

            let mut records = match self.store.fetch_all() {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Store load failed, starting empty");
                    Vec::new()
                }
            };

            for record in &mut records {
                self.apply_stored_favorite(record);
                state.ledger.insert_id(&record.id);
            }

            info!(records = records.len(), "Loaded persisted recipes");
            state.recipes = records;
            state.recipes.len()
        };

        if loaded == 0 {
            match self.api.search(None, ApiSortOption::Rating, None).await {
                Ok(records) => {
                    let added = self.merge_new(records).await;
                    debug!(added, "Seeded collection from remote");
                }
                Err(e) => warn!(error = %e, "Initial remote fetch failed"),
            }
        }

        let total = self.record_count().await;
        self.emit(IngestEvent::LoadComplete { total });
        total
    }

    /// Fetches the next page of the unfiltered listing.
    ///
    /// Increments and persists the page cursor, fetches exactly one page,
    /// merges and persists. Unless `forced`, becomes a no-op once the
    /// ledger already holds the preferred minimum number of recipes.
    pub async fn load_more(&self, forced: bool) {
        if !forced {
            let state = self.state.lock().await;
            if state.ledger.id_count() >= self.api.config().preferred_minimum_recipes {
                debug!("Enough recipes ingested, skipping load_more");
                return;
            }
        }

        let cursor = self.store.page_cursor().unwrap_or(0) + 1;
        if let Err(e) = self.store.set_page_cursor(cursor) {
            warn!(error = %e, cursor, "Failed to persist page cursor");
        }

        match self
            .api
            .search(None, ApiSortOption::Rating, Some(cursor))
            .await
        {
            Ok(records) => {
                let added = self.merge_new(records).await;
                self.emit(IngestEvent::PageMerged {
                    page: cursor,
                    added,
                });
            }
            Err(e) => warn!(error = %e, page = cursor, "load_more page fetch failed"),
        }

        let total = self.record_count().await;
        self.emit(IngestEvent::LoadComplete { total });
    }

    /// Searches the remote API for the given terms, page by page.
    ///
    /// A term combination already pending or committed short-circuits with
    /// no network call. Otherwise pages 1 through `max_search_page` are
    /// fetched sequentially, each merged and announced as it lands; an
    /// empty page ends the search early. The combination is committed only
    /// if at least one page succeeded, so a fully failed search can be
    /// retried later.
    pub async fn search(&self, terms: &[String]) {
        let combined = terms.join(" ");

        {
            let mut state = self.state.lock().await;
            if !state.ledger.begin_search(&combined) {
                debug!(terms = %combined, "Search already pending or committed");
                drop(state);
                self.emit(IngestEvent::SearchComplete { terms: combined });
                return;
            }
        }

        let mut any_success = false;
        for page in 1..=self.api.config().max_search_page {
            match self
                .api
                .search(Some(terms), ApiSortOption::Rating, Some(page))
                .await
            {
                Ok(records) => {
                    any_success = true;
                    let last_page = records.is_empty();
                    let added = self.merge_new(records).await;
                    self.emit(IngestEvent::PageMerged { page, added });
                    if last_page {
                        debug!(terms = %combined, page, "Empty page, ending search");
                        break;
                    }
                }
                Err(e) => {
                    warn!(terms = %combined, page, error = %e, "Search page failed, continuing");
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            state.ledger.commit_search(&combined, any_success);
            if any_success {
                self.persist_ledger(&state.ledger);
            }
        }

        info!(terms = %combined, success = any_success, "Search complete");
        self.emit(IngestEvent::SearchComplete { terms: combined });
    }

    /// Fetches full details for a record and merges them in.
    ///
    /// Only the ingredient list is replaced; `is_favorite` and
    /// `completed_ingredients` are preserved. Returns the merged record,
    /// or `None` when the fetch fails or the id is not in the collection.
    pub async fn get_details(&self, id: &str) -> Option<RecipeRecord> {
        let updated = match self.api.details(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(id, error = %e, "Detail fetch failed");
                return None;
            }
        };

        let mut state = self.state.lock().await;
        let Some(record) = state.recipes.iter_mut().find(|r| r.id == id) else {
            warn!(id, "Detail fetched for a record not in the collection");
            return None;
        };

        record.merge_details(&updated);
        let merged = record.clone();

        if let Err(e) = self.store.upsert(&merged) {
            warn!(id, error = %e, "Failed to stage detail merge");
        }
        if let Err(e) = self.store.commit() {
            warn!(id, error = %e, "Failed to commit detail merge");
        }

        Some(merged)
    }

    /// Snapshot of the collection in insertion order.
    pub async fn records(&self) -> Vec<RecipeRecord> {
        self.state.lock().await.recipes.clone()
    }

    /// Number of records in the collection.
    pub async fn record_count(&self) -> usize {
        self.state.lock().await.recipes.len()
    }

    /// Flips the favorite flag of a record, persisting it independently of
    /// the record store. Returns the new value, or `None` for an unknown
    /// id.
    pub async fn toggle_favorite(&self, id: &str) -> Option<bool> {
        let mut state = self.state.lock().await;
        let record = state.recipes.iter_mut().find(|r| r.id == id)?;
        record.is_favorite = !record.is_favorite;
        let favorite = record.is_favorite;
        let staged = record.clone();

        if let Err(e) = self.store.set_favorite(id, favorite) {
            warn!(id, error = %e, "Failed to persist favorite flag");
        }
        if let Err(e) = self.store.upsert(&staged) {
            warn!(id, error = %e, "Failed to stage favorite change");
        }

        Some(favorite)
    }

    /// Marks an ingredient of a record as completed or not. Returns `false`
    /// for an unknown id.
    pub async fn set_ingredient_completed(&self, id: &str, ingredient: &str, completed: bool) -> bool {
        let mut state = self.state.lock().await;
        let Some(record) = state.recipes.iter_mut().find(|r| r.id == id) else {
            return false;
        };

        record.set_ingredient_completed(ingredient, completed);
        let staged = record.clone();

        if let Err(e) = self.store.upsert(&staged) {
            warn!(id, error = %e, "Failed to stage ingredient completion");
        }
        if let Err(e) = self.store.commit() {
            warn!(id, error = %e, "Failed to commit ingredient completion");
        }
        true
    }

    /// Appends the records whose ids are new, updates the ledger, and
    /// persists the batch. Records with known ids are discarded; only
    /// [`get_details`](Self::get_details) performs field-level merging.
    ///
    /// Returns the number of records actually added.
    async fn merge_new(&self, fetched: Vec<RecipeRecord>) -> usize {
        let mut state = self.state.lock().await;
        let mut added = 0;

        for mut record in fetched {
            if state.ledger.is_known(&record.id) {
                continue;
            }

            self.apply_stored_favorite(&mut record);
            state.ledger.insert_id(&record.id);
            if let Err(e) = self.store.upsert(&record) {
                warn!(id = %record.id, error = %e, "Failed to stage new record");
            }
            state.recipes.push(record);
            added += 1;
        }

        if added > 0 {
            self.persist_ledger(&state.ledger);
        }

        debug!(added, total = state.recipes.len(), "Merged fetched records");
        added
    }

    /// Restores a record's favorite flag from its independently persisted
    /// value, if one exists.
    fn apply_stored_favorite(&self, record: &mut RecipeRecord) {
        match self.store.favorite(&record.id) {
            Ok(Some(favorite)) => record.is_favorite = favorite,
            Ok(None) => {}
            Err(e) => warn!(id = %record.id, error = %e, "Favorite lookup failed"),
        }
    }

    fn persist_ledger(&self, ledger: &IdentityLedger) {
        if let Err(e) = self.store.store_ledger(&ledger.snapshot()) {
            warn!(error = %e, "Failed to stage ledger");
        }
        if let Err(e) = self.store.commit() {
            warn!(error = %e, "Store commit failed; in-memory state remains authoritative");
        }
    }

    fn emit(&self, event: IngestEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
