//! In-memory partition store

use crate::error::Result;
use crate::store::PartitionStore;
use crate::types::{CacheStats, CachedResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

struct Partition {
    name: String,
    entries: HashMap<String, CachedResponse>,
}

impl Partition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// A partition store that lives only as long as the process
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<Vec<Partition>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn open(&self, partition: &str) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        if !partitions.iter().any(|p| p.name == partition) {
            partitions.push(Partition::new(partition));
            debug!(partition, "Opened partition");
        }
        Ok(())
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let partitions = self.partitions.read().await;
        Ok(partitions.iter().map(|p| p.name.clone()).collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|p| p.name != partition);
        Ok(partitions.len() != before)
    }

    async fn put(&self, partition: &str, key: &str, response: CachedResponse) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        let index = match partitions.iter().position(|p| p.name == partition) {
            Some(index) => index,
            None => {
                partitions.push(Partition::new(partition));
                partitions.len() - 1
            }
        };
        partitions[index].entries.insert(key.to_string(), response);
        debug!(partition, key, "Stored response");
        Ok(())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>> {
        let found = {
            let partitions = self.partitions.read().await;
            partitions
                .iter()
                .find(|p| p.name == partition)
                .and_then(|p| p.entries.get(key).cloned())
        };
        self.record(found.is_some());
        Ok(found)
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .iter_mut()
            .find(|p| p.name == partition)
            .is_some_and(|p| p.entries.remove(key).is_some()))
    }

    async fn match_any(&self, key: &str) -> Result<Option<CachedResponse>> {
        let found = {
            let partitions = self.partitions.read().await;
            partitions
                .iter()
                .find_map(|p| p.entries.get(key).cloned())
        };
        self.record(found.is_some());
        Ok(found)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let partitions = self.partitions.read().await;
        let mut keys: Vec<String> = partitions
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn stats(&self) -> CacheStats {
        let partitions = self.partitions.read().await;
        CacheStats {
            partitions: partitions.len(),
            entries: partitions.iter().map(|p| p.entries.len()).sum(),
            total_size: partitions
                .iter()
                .flat_map(|p| p.entries.values())
                .map(CachedResponse::size)
                .sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &[u8]) -> CachedResponse {
        CachedResponse::new("https://app.test/index.html", 200, body.to_vec())
            .with_header("content-type", "text/html")
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let store = MemoryStore::new();
        let stored = response(b"<html>shell</html>");

        store
            .put("static-v1", "https://app.test/index.html", stored.clone())
            .await
            .unwrap();

        let fetched = store
            .get("static-v1", "https://app.test/index.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.put("p", "k", response(b"first")).await.unwrap();
        store.put("p", "k", response(b"second")).await.unwrap();

        let fetched = store.get("p", "k").await.unwrap().unwrap();
        assert_eq!(fetched.body, b"second");
        assert_eq!(store.keys("p").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_single_entry() {
        let store = MemoryStore::new();
        store.put("p", "a", response(b"a")).await.unwrap();
        store.put("p", "b", response(b"b")).await.unwrap();

        assert!(store.delete("p", "a").await.unwrap());
        assert!(!store.delete("p", "a").await.unwrap());
        assert!(!store.delete("missing", "b").await.unwrap());
        assert_eq!(store.keys("p").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_partitions_keep_creation_order() {
        let store = MemoryStore::new();
        store.open("b").await.unwrap();
        store.open("a").await.unwrap();
        store.open("b").await.unwrap();

        assert_eq!(store.partitions().await.unwrap(), vec!["b", "a"]);
        assert!(store.has_partition("a").await.unwrap());
        assert!(!store.has_partition("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_match_any_searches_all_partitions() {
        let store = MemoryStore::new();
        store.open("static").await.unwrap();
        store.put("dynamic", "k", response(b"dyn")).await.unwrap();

        let found = store.match_any("k").await.unwrap().unwrap();
        assert_eq!(found.body, b"dyn");
        assert!(store.match_any("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_prefers_older_partition() {
        let store = MemoryStore::new();
        store.put("first", "k", response(b"one")).await.unwrap();
        store.put("second", "k", response(b"two")).await.unwrap();

        let found = store.match_any("k").await.unwrap().unwrap();
        assert_eq!(found.body, b"one");
    }

    #[tokio::test]
    async fn test_delete_partition_removes_entries() {
        let store = MemoryStore::new();
        store.put("old", "k", response(b"stale")).await.unwrap();

        assert!(store.delete_partition("old").await.unwrap());
        assert!(!store.delete_partition("old").await.unwrap());
        assert!(store.match_any("k").await.unwrap().is_none());
        assert!(store.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let store = MemoryStore::new();
        store.get("p", "k").await.unwrap();
        store.put("p", "k", response(b"data")).await.unwrap();
        store.get("p", "k").await.unwrap();
        store.match_any("k").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.partitions, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, 4);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
