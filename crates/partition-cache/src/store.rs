//! The storage seam shared by every backend

use crate::error::Result;
use crate::types::{CacheStats, CachedResponse};
use async_trait::async_trait;

/// A key/value blob store split into named partitions.
///
/// Every method is atomic from the caller's point of view. Partitions are
/// listed in creation order, and `match_any` searches them in that order.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition if it does not exist yet
    async fn open(&self, partition: &str) -> Result<()>;

    async fn has_partition(&self, partition: &str) -> Result<bool> {
        Ok(self.partitions().await?.iter().any(|p| p == partition))
    }

    /// Partition names in creation order
    async fn partitions(&self) -> Result<Vec<String>>;

    /// Delete a partition and all of its entries, returning whether it existed
    async fn delete_partition(&self, partition: &str) -> Result<bool>;

    /// Store a response, replacing any previous entry for `key`
    async fn put(&self, partition: &str, key: &str, response: CachedResponse) -> Result<()>;

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>>;

    /// Remove one entry, returning whether it existed
    async fn delete(&self, partition: &str, key: &str) -> Result<bool>;

    /// Look `key` up in every partition, returning the first hit
    async fn match_any(&self, key: &str) -> Result<Option<CachedResponse>>;

    async fn keys(&self, partition: &str) -> Result<Vec<String>>;

    async fn stats(&self) -> CacheStats;
}
