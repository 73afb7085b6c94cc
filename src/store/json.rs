//! JSON-file-backed implementation of the persistent store.
//!
//! Two files live under the data directory:
//! - `recipes.json` - the record collection, in insertion order
//! - `state.json` - scalar state: page cursor, ledger snapshot, favorites
//!
//! Writes are staged in memory by `upsert`/`set_*` and flushed by `commit`.
//! The scalar setters also flush immediately, so favorites and the page
//! cursor stay durable even when no record commit follows.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::model::RecipeRecord;

use super::{LedgerSnapshot, PersistentStore, StoreError};

const RECIPES_FILE: &str = "recipes.json";
const STATE_FILE: &str = "state.json";

/// Scalar state persisted alongside the records.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ScalarState {
    #[serde(default)]
    page_cursor: u32,
    #[serde(default)]
    ledger: LedgerSnapshot,
    #[serde(default)]
    favorites: HashMap<String, bool>,
}

/// Working state guarded by one lock: records plus scalars.
#[derive(Debug, Default)]
struct StoreState {
    records: Vec<RecipeRecord>,
    scalars: ScalarState,
}

/// Default store: JSON files under a data directory.
pub struct JsonFileStore {
    data_dir: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Opens the store, creating the data directory if needed and loading
    /// any previously persisted state.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;

        let records = Self::load_records(&config.data_dir)?;
        let scalars = Self::load_scalars(&config.data_dir)?;

        info!(
            dir = %config.data_dir.display(),
            records = records.len(),
            cursor = scalars.page_cursor,
            "Opened recipe store"
        );

        Ok(Self {
            data_dir: config.data_dir,
            state: Mutex::new(StoreState { records, scalars }),
        })
    }

    fn load_records(dir: &Path) -> Result<Vec<RecipeRecord>, StoreError> {
        let path = dir.join(RECIPES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(format!("{RECIPES_FILE}: {e}")))
    }

    fn load_scalars(dir: &Path) -> Result<ScalarState, StoreError> {
        let path = dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(ScalarState::default());
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(format!("{STATE_FILE}: {e}")))
    }

    fn write_all(&self, state: &StoreState) -> Result<(), StoreError> {
        let records = serde_json::to_vec_pretty(&state.records)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        fs::write(self.data_dir.join(RECIPES_FILE), records)?;

        self.write_scalars(&state.scalars)
    }

    fn write_scalars(&self, scalars: &ScalarState) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(scalars).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        fs::write(self.data_dir.join(STATE_FILE), bytes)?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn fetch_all(&self) -> Result<Vec<RecipeRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.records.clone())
    }

    fn upsert(&self, record: &RecipeRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => state.records.push(record.clone()),
        }
        Ok(())
    }

    fn query_by_id(&self, id: &str) -> Result<Option<RecipeRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let state = self.state.lock().unwrap();
        self.write_all(&state)?;
        debug!(records = state.records.len(), "Store committed");
        Ok(())
    }

    fn page_cursor(&self) -> Result<u32, StoreError> {
        Ok(self.state.lock().unwrap().scalars.page_cursor)
    }

    fn set_page_cursor(&self, cursor: u32) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.scalars.page_cursor = cursor;
        self.write_scalars(&state.scalars)
    }

    fn load_ledger(&self) -> Result<LedgerSnapshot, StoreError> {
        Ok(self.state.lock().unwrap().scalars.ledger.clone())
    }

    fn store_ledger(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.scalars.ledger = snapshot.clone();
        Ok(())
    }

    fn favorite(&self, id: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.state.lock().unwrap().scalars.favorites.get(id).copied())
    }

    fn set_favorite(&self, id: &str, favorite: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.scalars.favorites.insert(id.to_string(), favorite);
        self.write_scalars(&state.scalars)
    }
}
