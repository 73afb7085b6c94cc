//! Local sorting and filtering of the ingested collection.
//!
//! Sorts are pure functions over an immutable snapshot, recomputed whenever
//! the active option changes. Filtering is a case-insensitive substring
//! match over each record's searchable text, with an optimization that
//! re-filters the previous result set when the new filter provably narrows
//! the old one.

use rand::seq::SliceRandom;

use crate::model::RecipeRecord;

/// How the recipe collection is ordered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    /// Ascending by title.
    Alphabetical,
    /// Ascending by number of ingredients, ties by aggregator URL.
    ByIngredientCount,
    /// Favorites first, ties by id.
    #[default]
    ByFavorite,
    /// Uniform shuffle, reseeded every time it is applied.
    Random,
}

/// Returns a sorted copy of the records.
pub fn sort_records(records: &[RecipeRecord], option: SortOption) -> Vec<RecipeRecord> {
    let mut sorted = records.to_vec();
    match option {
        SortOption::Alphabetical => {
            sorted.sort_by(|a, b| a.title.cmp(&b.title));
        }
        SortOption::ByIngredientCount => {
            sorted.sort_by(|a, b| {
                a.ingredients
                    .len()
                    .cmp(&b.ingredients.len())
                    .then_with(|| a.food2fork_url.cmp(&b.food2fork_url))
            });
        }
        SortOption::ByFavorite => {
            sorted.sort_by(|a, b| {
                b.is_favorite
                    .cmp(&a.is_favorite)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        SortOption::Random => {
            sorted.shuffle(&mut rand::thread_rng());
        }
    }
    sorted
}

/// Returns the records whose searchable text contains `filter`,
/// case-insensitively. An empty filter matches everything.
pub fn filter_records(records: &[RecipeRecord], filter: &str) -> Vec<RecipeRecord> {
    let needle = filter.to_lowercase();
    records
        .iter()
        .filter(|r| r.searchable_text().contains(&needle))
        .cloned()
        .collect()
}

/// Incremental filter state over the full collection.
///
/// Tracks the last filter string and its result so that typing one more
/// character only re-scans the already-narrowed subset: when the new
/// (lowercased) filter contains the old one as a substring, every match of
/// the new filter already matched the old, so the subset is a safe starting
/// point. Any other transition restarts from the full collection.
#[derive(Debug, Default)]
pub struct RecipeBrowser {
    filtered: Option<Vec<RecipeRecord>>,
    last_filter: Option<String>,
}

impl RecipeBrowser {
    /// Creates a browser with no filter applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a filter over the full collection, reusing the previous
    /// result when the new filter is a provable narrowing of the old.
    ///
    /// Returns the filtered view. An empty filter clears the state and
    /// returns the full collection.
    pub fn filter(&mut self, all: &[RecipeRecord], text: &str) -> Vec<RecipeRecord> {
        if text.is_empty() {
            self.clear();
            return all.to_vec();
        }

        let needle = text.to_lowercase();
        let narrows = self
            .last_filter
            .as_ref()
            .is_some_and(|last| needle.contains(last.as_str()));

        let result = if narrows {
            let subset = self.filtered.as_deref().unwrap_or(all);
            filter_records(subset, &needle)
        } else {
            filter_records(all, &needle)
        };

        self.last_filter = Some(needle);
        self.filtered = Some(result.clone());
        result
    }

    /// The current filtered view, if a filter is active.
    pub fn filtered(&self) -> Option<&[RecipeRecord]> {
        self.filtered.as_deref()
    }

    /// The currently applied filter string, lowercased.
    pub fn last_filter(&self) -> Option<&str> {
        self.last_filter.as_deref()
    }

    /// Clears any active filter.
    pub fn clear(&mut self) {
        self.filtered = None;
        self.last_filter = None;
    }
}
