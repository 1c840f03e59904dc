// Book Database - Personal Book Review Library
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Read-through query cache
//!
//! Results are stored as JSON under a SHA-256 hash of the normalized filter
//! and grouped by table, so a write can drop every cached result for that
//! table in one call. Entries expire after the configured TTL.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// TTL cache shared by every clone of a [`crate::storage::Database`]
#[derive(Debug)]
pub struct QueryCache {
    ttl: Duration,
    groups: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stable key for `filter` within `group`
    pub fn key<F: Serialize>(group: &str, filter: &F) -> Result<String> {
        let normalized = serde_json::to_string(filter)?;
        let mut hasher = Sha256::new();
        hasher.update(group.as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Cached value, if present and not expired
    pub async fn get<T: DeserializeOwned>(&self, group: &str, key: &str) -> Option<T> {
        let groups = self.groups.read().await;
        let entry = groups.get(group)?.get(key)?;

        if entry.expires_at <= Instant::now() {
            return None;
        }

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                tracing::debug!(group, key, "cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(group, key, "discarding unreadable cache entry: {}", e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, group: &str, key: String, value: &T) -> Result<()> {
        if self.ttl.is_zero() {
            return Ok(());
        }

        let entry = CacheEntry {
            value: serde_json::to_value(value)?,
            expires_at: Instant::now() + self.ttl,
        };

        let mut groups = self.groups.write().await;
        let bucket = groups.entry(group.to_string()).or_default();
        bucket.retain(|_, e| e.expires_at > Instant::now());
        bucket.insert(key, entry);
        Ok(())
    }

    /// Drop every entry in `group`
    pub async fn invalidate_group(&self, group: &str) {
        let removed = self
            .groups
            .write()
            .await
            .remove(group)
            .map(|bucket| bucket.len())
            .unwrap_or(0);

        if removed > 0 {
            tracing::debug!(group, removed, "cache group invalidated");
        }
    }

    pub async fn clear(&self) {
        self.groups.write().await.clear();
    }

    /// Number of live entries in `group`
    pub async fn len(&self, group: &str) -> usize {
        let now = Instant::now();
        self.groups
            .read()
            .await
            .get(group)
            .map(|bucket| bucket.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_stable_and_group_scoped() {
        let filter = json!({"taxonomy": "genre", "number": 0});
        let a = QueryCache::key("book_terms", &filter).unwrap();
        let b = QueryCache::key("book_terms", &filter).unwrap();
        let c = QueryCache::key("books", &filter).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = QueryCache::key("book_terms", &"all").unwrap();

        cache.set("book_terms", key.clone(), &vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.get::<Vec<i32>>("book_terms", &key).await, Some(vec![1, 2, 3]));
        assert_eq!(cache.len("book_terms").await, 1);

        cache.invalidate_group("book_terms").await;
        assert_eq!(cache.get::<Vec<i32>>("book_terms", &key).await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = QueryCache::new(Duration::from_millis(20));
        cache.set("g", "k".to_string(), &7).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get::<i32>("g", "k").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.set("g", "k".to_string(), &7).await.unwrap();
        assert_eq!(cache.len("g").await, 0);
    }
}
