//! Time-windowed read-through cache for API responses
//!
//! Each entry is two storage keys: `cache:<key>` holding `{"payload": ...}`
//! and `cache:<key>:timestamp` holding the write instant as a decimal
//! millisecond string. An entry is served only while
//! `now - timestamp < ttl`; anything older, missing or unreadable is a miss.
//!
//! `:` and `%` inside a caller key are percent-escaped in storage, so a key
//! such as `a:timestamp` can never land on the timestamp slot of `a`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::models::PostRecord;
use crate::storage::KeyValueStore;

const KEY_PREFIX: &str = "cache:";
const TIMESTAMP_SUFFIX: &str = ":timestamp";

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Serialize)]
struct EntryRef<'a, T> {
    payload: &'a T,
}

#[derive(Deserialize)]
struct Entry<T> {
    payload: T,
}

pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        }
    }

    fn entry_key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, escape_key(key))
    }

    fn timestamp_key(key: &str) -> String {
        format!("{}{}{}", KEY_PREFIX, escape_key(key), TIMESTAMP_SUFFIX)
    }

    /// Payload stored under `key`, if present and fresh.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let stored_at = self.stored_at(key)?;
        let age = self.clock.now_ms().saturating_sub(stored_at);
        if age >= self.ttl_ms {
            tracing::debug!("Cache entry {} is stale ({} ms old)", key, age);
            return None;
        }

        let raw = match self.store.get(&Self::entry_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<Entry<T>>(&raw) {
            Ok(entry) => Some(entry.payload),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store `payload` under `key`, stamped now. Failures are logged.
    pub fn set<T: Serialize>(&self, key: &str, payload: &T) {
        let raw = match serde_json::to_string(&EntryRef { payload }) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Cannot serialize cache payload for {}: {}", key, e);
                return;
            }
        };

        let written = self
            .store
            .set(&Self::entry_key(key), &raw)
            .and_then(|()| {
                self.store
                    .set(&Self::timestamp_key(key), &self.clock.now_ms().to_string())
            });
        if let Err(e) = written {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Remove the entry for `key`; no-op when absent.
    pub fn clear(&self, key: &str) {
        for storage_key in [Self::entry_key(key), Self::timestamp_key(key)] {
            if let Err(e) = self.store.remove(&storage_key) {
                tracing::warn!("Cache clear failed for {}: {}", key, e);
            }
        }
    }

    /// Caller-facing keys of every stored entry, fresh or not.
    pub fn keys(&self) -> Vec<String> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Cannot enumerate cache: {}", e);
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX))
            .filter(|k| !k.contains(':'))
            .map(unescape_key)
            .collect()
    }

    /// Every post record found in fresh entries: single records, lists of
    /// records, and `{ posts: [...] }` / `{ items: [...] }` pages.
    pub fn records(&self) -> Vec<PostRecord> {
        let mut records = Vec::new();
        for key in self.keys() {
            if let Some(payload) = self.get::<serde_json::Value>(&key) {
                collect_records(payload, &mut records);
            }
        }
        records
    }

    fn stored_at(&self, key: &str) -> Option<i64> {
        let raw = match self.store.get(&Self::timestamp_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                tracing::warn!("Discarding cache entry {} with bad timestamp {:?}", key, raw);
                None
            }
        }
    }
}

fn escape_key(key: &str) -> String {
    key.replace('%', "%25").replace(':', "%3A")
}

fn unescape_key(stored: &str) -> String {
    stored.replace("%3A", ":").replace("%25", "%")
}

fn collect_records(payload: serde_json::Value, out: &mut Vec<PostRecord>) {
    match payload {
        serde_json::Value::Array(items) => {
            for item in items {
                push_record(item, out);
            }
        }
        serde_json::Value::Object(mut map) => {
            let page = map
                .remove("posts")
                .or_else(|| map.remove("items"))
                .filter(serde_json::Value::is_array);
            match page {
                Some(list) => collect_records(list, out),
                None => push_record(serde_json::Value::Object(map), out),
            }
        }
        _ => {}
    }
}

fn push_record(value: serde_json::Value, out: &mut Vec<PostRecord>) {
    if !value.is_object() {
        return;
    }
    if let Ok(record) = serde_json::from_value::<PostRecord>(value) {
        if record.id.is_some() || record.slug.is_some() || record.url.is_some() {
            out.push(record);
        }
    }
}
