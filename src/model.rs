//! Recipe record model.
//!
//! A [`RecipeRecord`] is the unit the ingestion pipeline moves around:
//! decoded from the remote API, persisted through the store, and mutated by
//! user actions. Identity, equality and hashing are by `id` alone, so a
//! record fetched twice (search page and detail endpoint) always collapses
//! onto one collection entry.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single recipe.
///
/// Remote-sourced fields are treated as immutable once set, except
/// `ingredients`, which a detail fetch may replace. `is_favorite` and
/// `completed_ingredients` are user-owned and survive any remote merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRecord {
    /// Recipe ID as returned by the search query. Unique and stable.
    pub id: String,
    /// Title of the recipe.
    pub title: String,
    /// Name of the publisher.
    pub publisher: String,
    /// Base URL of the publisher's site.
    pub publisher_url: Option<String>,
    /// Original URL of the recipe on the publisher's site.
    pub source_url: Option<String>,
    /// URL of the recipe image.
    pub image_url: Option<String>,
    /// URL of the recipe on the aggregator site.
    pub food2fork_url: String,
    /// Social ranking as computed by the aggregator.
    pub social_rank: Option<f64>,
    /// Ordered ingredient list. Empty until a detail fetch fills it in.
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Whether the user has favorited this recipe.
    #[serde(default)]
    pub is_favorite: bool,
    /// Which ingredients the user has checked off.
    #[serde(default)]
    pub completed_ingredients: HashMap<String, bool>,
}

impl RecipeRecord {
    /// Merge a freshly fetched detail record into this one.
    ///
    /// Only the ingredient list is taken from the update; everything else,
    /// including `is_favorite` and `completed_ingredients`, stays as-is.
    pub fn merge_details(&mut self, updated: &RecipeRecord) {
        if !updated.ingredients.is_empty() {
            self.ingredients = updated.ingredients.clone();
        }
    }

    /// Mark an ingredient as completed or not.
    pub fn set_ingredient_completed(&mut self, ingredient: &str, completed: bool) {
        self.completed_ingredients
            .insert(ingredient.to_string(), completed);
    }

    /// Whether the user has checked off the given ingredient.
    pub fn is_ingredient_completed(&self, ingredient: &str) -> bool {
        self.completed_ingredients
            .get(ingredient)
            .copied()
            .unwrap_or(false)
    }

    /// All text that can be matched by the local filter, lowercased.
    ///
    /// Concatenates id, title, publisher, every URL, and the ingredients.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.id);
        text.push('\n');
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.publisher);
        text.push('\n');
        text.push_str(&self.food2fork_url);
        for url in [&self.publisher_url, &self.source_url] {
            if let Some(url) = url {
                text.push('\n');
                text.push_str(url);
            }
        }
        if !self.ingredients.is_empty() {
            text.push('\n');
            text.push_str(&self.ingredients.join(" "));
        }
        text.to_lowercase()
    }
}

impl PartialEq for RecipeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecipeRecord {}

impl Hash for RecipeRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(id: &str, title: &str) -> RecipeRecord {
        RecipeRecord {
            id: id.to_string(),
            title: title.to_string(),
            publisher: "Test Kitchen".to_string(),
            publisher_url: Some("http://testkitchen.example.com".to_string()),
            source_url: Some(format!("http://testkitchen.example.com/{id}")),
            image_url: Some(format!("http://img.example.com/{id}.jpg")),
            food2fork_url: format!("http://food2fork.com/view/{id}"),
            social_rank: Some(99.5),
            ingredients: vec!["flour".to_string(), "butter".to_string()],
            is_favorite: false,
            completed_ingredients: HashMap::new(),
        }
    }

    #[test]
    fn test_equality_is_by_id_only() {
        let a = test_record("35120", "Pie");
        let mut b = test_record("35120", "Completely Different Title");
        b.publisher = "Elsewhere".to_string();

        assert_eq!(a, b);
        assert_ne!(a, test_record("35121", "Pie"));
    }

    #[test]
    fn test_hash_follows_id() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(test_record("1", "One"));
        set.insert(test_record("1", "Renamed"));
        set.insert(test_record("2", "Two"));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_merge_details_replaces_only_ingredients() {
        let mut record = test_record("35120", "Pie");
        record.is_favorite = true;
        record.set_ingredient_completed("flour", true);

        let mut updated = test_record("35120", "Renamed Pie");
        updated.publisher = "Someone Else".to_string();
        updated.ingredients = vec!["apples".to_string(), "cinnamon".to_string()];

        record.merge_details(&updated);

        assert_eq!(record.title, "Pie");
        assert_eq!(record.publisher, "Test Kitchen");
        assert_eq!(record.ingredients, vec!["apples", "cinnamon"]);
        assert!(record.is_favorite);
        assert!(record.is_ingredient_completed("flour"));
    }

    #[test]
    fn test_merge_details_keeps_ingredients_when_update_empty() {
        let mut record = test_record("35120", "Pie");
        let mut updated = test_record("35120", "Pie");
        updated.ingredients.clear();

        record.merge_details(&updated);

        assert_eq!(record.ingredients, vec!["flour", "butter"]);
    }

    #[test]
    fn test_ingredient_completion_toggle() {
        let mut record = test_record("35120", "Pie");

        assert!(!record.is_ingredient_completed("flour"));
        record.set_ingredient_completed("flour", true);
        assert!(record.is_ingredient_completed("flour"));
        record.set_ingredient_completed("flour", false);
        assert!(!record.is_ingredient_completed("flour"));
    }

    #[test]
    fn test_searchable_text_contents() {
        let record = test_record("35120", "Perfect Iced Coffee");
        let text = record.searchable_text();

        assert!(text.contains("35120"));
        assert!(text.contains("perfect iced coffee"));
        assert!(text.contains("test kitchen"));
        assert!(text.contains("food2fork.com/view/35120"));
        assert!(text.contains("flour butter"));
    }

    #[test]
    fn test_searchable_text_is_lowercased() {
        let record = test_record("35120", "UPPERCASE TITLE");
        assert!(record.searchable_text().contains("uppercase title"));
        assert!(!record.searchable_text().contains("UPPERCASE"));
    }

    #[test]
    fn test_serde_round_trip_keeps_user_state() {
        let mut record = test_record("35120", "Pie");
        record.is_favorite = true;
        record.set_ingredient_completed("butter", true);

        let json = serde_json::to_string(&record).unwrap();
        let restored: RecipeRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, record);
        assert!(restored.is_favorite);
        assert!(restored.is_ingredient_completed("butter"));
    }
}
