// Categorizer - bucket flat warehouse rows into art / culture / tourism per state
// Pure and total: no I/O, no errors, empty input gives empty output

use std::collections::HashMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::records::{FinancialRecord, TourismRecord};
use crate::states::state_key;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Art,
    Culture,
    Tourism,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Art, Category::Culture, Category::Tourism];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Art => "art",
            Category::Culture => "culture",
            Category::Tourism => "tourism",
        }
    }
}

// ============================================================================
// ORDERED STATE MAP
// ============================================================================

/// Map keyed by state that remembers first-insertion order.
///
/// Serializes as a JSON object in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMap<V> {
    order: Vec<String>,
    entries: HashMap<String, V>,
}

impl<V> StateMap<V> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Existing value for `key`, or a fresh default appended at the end
    pub fn entry_or_default(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        if !self.entries.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.entries.entry(key.to_string()).or_default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<V> Default for StateMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for StateMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ============================================================================
// CATEGORIZED DATA
// ============================================================================

/// Records that put one state into one category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateBucket {
    pub financial: Vec<FinancialRecord>,
    pub tourism: Vec<TourismRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorizedData {
    pub art: StateMap<StateBucket>,
    pub culture: StateMap<StateBucket>,
    pub tourism: StateMap<StateBucket>,
}

impl CategorizedData {
    pub fn bucket(&self, category: Category) -> &StateMap<StateBucket> {
        match category {
            Category::Art => &self.art,
            Category::Culture => &self.culture,
            Category::Tourism => &self.tourism,
        }
    }

    fn bucket_mut(&mut self, category: Category) -> &mut StateMap<StateBucket> {
        match category {
            Category::Art => &mut self.art,
            Category::Culture => &mut self.culture,
            Category::Tourism => &mut self.tourism,
        }
    }

    fn state_bucket(&mut self, category: Category, state: &str) -> &mut StateBucket {
        self.bucket_mut(category).entry_or_default(state)
    }
}

/// Group both result sets per category and state.
///
/// Financial rows count for art and culture unconditionally. Tourism rows go
/// wherever their flags point, possibly nowhere. Every record is appended;
/// duplicates upstream stay duplicates here.
pub fn categorize(financial: &[FinancialRecord], tourism: &[TourismRecord]) -> CategorizedData {
    let mut data = CategorizedData::default();

    for record in financial {
        let state = state_key(&record.state_ut);
        for category in [Category::Art, Category::Culture] {
            data.state_bucket(category, &state).financial.push(record.clone());
        }
    }

    for record in tourism {
        let state = state_key(&record.state);
        let flagged = [
            (Category::Art, record.has_art),
            (Category::Culture, record.has_culture),
            (Category::Tourism, record.has_tourism),
        ];
        for (category, _) in flagged.into_iter().filter(|(_, on)| *on) {
            data.state_bucket(category, &state).tourism.push(record.clone());
        }
    }

    data
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateFlags {
    pub art: bool,
    pub culture: bool,
    pub tourism: bool,
}

impl StateFlags {
    fn set(&mut self, category: Category) {
        match category {
            Category::Art => self.art = true,
            Category::Culture => self.culture = true,
            Category::Tourism => self.tourism = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    #[serde(rename = "totalStates")]
    pub total_states: usize,
    pub states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStatistics {
    pub art: CategorySummary,
    pub culture: CategorySummary,
    pub tourism: CategorySummary,
}

/// Which categories each state appears in; states ordered by first appearance across art, culture, tourism
pub fn state_statistics(data: &CategorizedData) -> StateMap<StateFlags> {
    let mut stats: StateMap<StateFlags> = StateMap::new();
    for category in Category::ALL {
        for state in data.bucket(category).keys() {
            stats.entry_or_default(state).set(category);
        }
    }
    stats
}

pub fn category_statistics(data: &CategorizedData) -> CategoryStatistics {
    let summary = |category: Category| {
        let bucket = data.bucket(category);
        CategorySummary {
            total_states: bucket.len(),
            states: bucket.keys().map(String::from).collect(),
        }
    };

    CategoryStatistics {
        art: summary(Category::Art),
        culture: summary(Category::Culture),
        tourism: summary(Category::Tourism),
    }
}
