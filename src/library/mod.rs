//! Bookmarks and reading history
//!
//! Both are small JSON lists kept in the key-value store. Storage problems
//! degrade to an empty list rather than an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::storage::{self, KeyValueStore};

pub const BOOKMARKS_KEY: &str = "bookmarks";
pub const HISTORY_KEY: &str = "reading_history";

/// Oldest history entries beyond this are dropped.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    pub read_at: i64,
}

pub struct Library {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl Library {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn load_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match storage::load_json::<Vec<T>>(self.store.as_ref(), key) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable {} list: {}", key, e);
                Vec::new()
            }
        }
    }

    fn save_list<T: Serialize>(&self, key: &str, list: &[T]) {
        if let Err(e) = storage::save_json(self.store.as_ref(), key, &list) {
            tracing::warn!("Failed to save {} list: {}", key, e);
        }
    }

    /// Newest first.
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.load_list(BOOKMARKS_KEY)
    }

    pub fn is_bookmarked(&self, slug: &str) -> bool {
        self.bookmarks().iter().any(|b| b.slug == slug)
    }

    /// Add a bookmark. Returns false if the slug was already bookmarked.
    pub fn add_bookmark(&self, slug: &str, title: &str, url: Option<&str>) -> bool {
        let mut list = self.bookmarks();
        if list.iter().any(|b| b.slug == slug) {
            return false;
        }
        list.insert(
            0,
            Bookmark {
                slug: slug.to_string(),
                title: title.to_string(),
                url: url.map(str::to_string),
                added_at: self.clock.now_ms(),
            },
        );
        self.save_list(BOOKMARKS_KEY, &list);
        true
    }

    /// Remove a bookmark. Returns false if it was not present.
    pub fn remove_bookmark(&self, slug: &str) -> bool {
        let mut list = self.bookmarks();
        let before = list.len();
        list.retain(|b| b.slug != slug);
        if list.len() == before {
            return false;
        }
        self.save_list(BOOKMARKS_KEY, &list);
        true
    }

    /// Most recently read first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.load_list(HISTORY_KEY)
    }

    /// Move `slug` to the front of the history, replacing any older visit.
    pub fn record_visit(&self, slug: &str, title: &str, url: Option<&str>, chapter: Option<&str>) {
        let mut list = self.history();
        list.retain(|h| h.slug != slug);
        list.insert(
            0,
            HistoryEntry {
                slug: slug.to_string(),
                title: title.to_string(),
                url: url.map(str::to_string),
                chapter: chapter.map(str::to_string),
                read_at: self.clock.now_ms(),
            },
        );
        list.truncate(HISTORY_LIMIT);
        self.save_list(HISTORY_KEY, &list);
    }

    pub fn clear_history(&self) {
        if let Err(e) = self.store.remove(HISTORY_KEY) {
            tracing::warn!("Failed to clear history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn library() -> (Library, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        (Library::new(store.clone(), clock.clone()), store, clock)
    }

    #[test]
    fn test_bookmarks_add_dedupe_remove() {
        let (lib, _store, clock) = library();
        assert!(lib.add_bookmark("berserk-374", "Berserk 374", None));
        clock.advance(10);
        assert!(lib.add_bookmark("vagabond-1", "Vagabond 1", Some("https://b.example/v1")));
        assert!(!lib.add_bookmark("berserk-374", "again", None));

        let slugs: Vec<_> = lib.bookmarks().into_iter().map(|b| b.slug).collect();
        assert_eq!(slugs, vec!["vagabond-1", "berserk-374"]);
        assert!(lib.is_bookmarked("berserk-374"));

        assert!(lib.remove_bookmark("berserk-374"));
        assert!(!lib.remove_bookmark("berserk-374"));
        assert!(!lib.is_bookmarked("berserk-374"));
    }

    #[test]
    fn test_history_moves_revisits_to_front_and_caps() {
        let (lib, _store, clock) = library();
        for i in 0..(HISTORY_LIMIT + 5) {
            clock.advance(1);
            lib.record_visit(&format!("post-{}", i), "t", None, None);
        }
        lib.record_visit("post-10", "t", None, Some("ch. 3"));

        let history = lib.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].slug, "post-10");
        assert_eq!(history[0].chapter.as_deref(), Some("ch. 3"));
        assert_eq!(history.iter().filter(|h| h.slug == "post-10").count(), 1);
        assert_eq!(history[1].slug, format!("post-{}", HISTORY_LIMIT + 4));

        lib.clear_history();
        assert!(lib.history().is_empty());
    }

    #[test]
    fn test_corrupt_lists_read_as_empty() {
        let (lib, store, _clock) = library();
        store.set(BOOKMARKS_KEY, "{\"oops\":1}").unwrap();
        assert!(lib.bookmarks().is_empty());
        assert!(lib.add_bookmark("a", "A", None));
        assert_eq!(lib.bookmarks().len(), 1);
    }
}
