//! File-backed partition store with a JSON manifest

use crate::error::{Result, StoreError};
use crate::store::PartitionStore;
use crate::types::{CacheStats, CachedResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";
const BLOB_DIR: &str = "blobs";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    partitions: Vec<PartitionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartitionRecord {
    name: String,
    created_at: DateTime<Utc>,
    entries: BTreeMap<String, EntryRecord>,
}

/// Everything about a cached response except its body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    blob: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    size: u64,
    stored_at: DateTime<Utc>,
}

impl Manifest {
    fn partition(&self, name: &str) -> Option<&PartitionRecord> {
        self.partitions.iter().find(|p| p.name == name)
    }

    fn partition_mut(&mut self, name: &str) -> &mut PartitionRecord {
        let index = match self.partitions.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                self.partitions.push(PartitionRecord {
                    name: name.to_string(),
                    created_at: Utc::now(),
                    entries: BTreeMap::new(),
                });
                self.partitions.len() - 1
            }
        };
        &mut self.partitions[index]
    }
}

/// A partition store that keeps bodies on disk so cached content
/// survives restarts. Metadata is mirrored in memory and written back
/// to `manifest.json` after every mutation.
pub struct FileStore {
    root: PathBuf,
    manifest: RwLock<Manifest>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            manifest: RwLock::new(Manifest::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create the cache directory and load any manifest left by a previous run
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.root.join(BLOB_DIR)).await?;

        let path = self.root.join(MANIFEST_FILE);
        if fs::try_exists(&path).await? {
            let raw = fs::read(&path).await?;
            let loaded: Manifest = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
            *self.manifest.write().await = loaded;
        }

        let manifest = self.manifest.read().await;
        info!(
            cache_dir = ?self.root,
            partitions = manifest.partitions.len(),
            "Cache initialized"
        );
        Ok(())
    }

    /// Name of the body file for a key within a partition
    pub fn blob_name(partition: &str, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", partition, key).as_bytes());
        hex::encode(hasher.finalize())
    }

    fn blob_path(&self, blob: &str) -> PathBuf {
        self.root.join(BLOB_DIR).join(blob)
    }

    async fn persist(&self, manifest: &Manifest) -> Result<()> {
        write_atomic(&self.root.join(MANIFEST_FILE), &serde_json::to_vec(manifest)?).await
    }

    /// Read the body for `entry`. Callers hold the manifest lock, so the
    /// body always belongs to the metadata it is paired with.
    async fn read_entry(&self, entry: &EntryRecord) -> std::io::Result<CachedResponse> {
        let body = fs::read(self.blob_path(&entry.blob)).await?;
        Ok(CachedResponse {
            url: entry.url.clone(),
            status: entry.status,
            headers: entry.headers.clone(),
            body,
            stored_at: entry.stored_at,
        })
    }

    /// Drop an entry whose body could not be read, unless it was replaced
    /// after the failed read
    async fn forget(&self, partition: &str, key: &str, stale: &EntryRecord) {
        let mut manifest = self.manifest.write().await;
        let Some(record) = manifest.partitions.iter_mut().find(|p| p.name == partition) else {
            return;
        };
        if record.entries.get(key).map(|e| e.stored_at) != Some(stale.stored_at) {
            return;
        }
        record.entries.remove(key);
        if let Err(e) = self.persist(&manifest).await {
            warn!(error = %e, "Failed to persist manifest");
        }
    }

    fn record(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl PartitionStore for FileStore {
    async fn open(&self, partition: &str) -> Result<()> {
        let mut manifest = self.manifest.write().await;
        if manifest.partition(partition).is_none() {
            manifest.partition_mut(partition);
            self.persist(&manifest).await?;
            debug!(partition, "Opened partition");
        }
        Ok(())
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let manifest = self.manifest.read().await;
        Ok(manifest.partitions.iter().map(|p| p.name.clone()).collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let mut manifest = self.manifest.write().await;
        let Some(index) = manifest.partitions.iter().position(|p| p.name == partition) else {
            return Ok(false);
        };
        let removed = manifest.partitions.remove(index);
        self.persist(&manifest).await?;

        // Still under the lock, so a put to the same key cannot interleave
        for entry in removed.entries.values() {
            if let Err(e) = fs::remove_file(self.blob_path(&entry.blob)).await {
                // Orphaned files are harmless; the manifest no longer points at them
                debug!(blob = %entry.blob, error = %e, "Failed to remove cached body");
            }
        }
        drop(manifest);

        debug!(partition, entries = removed.entries.len(), "Deleted partition");
        Ok(true)
    }

    async fn put(&self, partition: &str, key: &str, response: CachedResponse) -> Result<()> {
        let blob = Self::blob_name(partition, key);
        let size = response.size();

        let mut manifest = self.manifest.write().await;
        write_atomic(&self.blob_path(&blob), &response.body).await?;

        manifest.partition_mut(partition).entries.insert(
            key.to_string(),
            EntryRecord {
                blob,
                url: response.url,
                status: response.status,
                headers: response.headers,
                size,
                stored_at: response.stored_at,
            },
        );
        self.persist(&manifest).await?;

        debug!(partition, key, size, "Stored response");
        Ok(())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>> {
        let missing = {
            let manifest = self.manifest.read().await;
            let Some(entry) = manifest.partition(partition).and_then(|p| p.entries.get(key)) else {
                self.record(false);
                return Ok(None);
            };
            match self.read_entry(entry).await {
                Ok(response) => {
                    self.record(true);
                    return Ok(Some(response));
                }
                Err(e) => {
                    warn!(partition, key, error = %e, "Failed to read cached body, removing entry");
                    entry.clone()
                }
            }
        };

        self.forget(partition, key, &missing).await;
        self.record(false);
        Ok(None)
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        let mut manifest = self.manifest.write().await;
        let Some(entry) = manifest
            .partitions
            .iter_mut()
            .find(|p| p.name == partition)
            .and_then(|p| p.entries.remove(key))
        else {
            return Ok(false);
        };
        self.persist(&manifest).await?;

        if let Err(e) = fs::remove_file(self.blob_path(&entry.blob)).await {
            debug!(blob = %entry.blob, error = %e, "Failed to remove cached body");
        }
        debug!(partition, key, "Deleted entry");
        Ok(true)
    }

    async fn match_any(&self, key: &str) -> Result<Option<CachedResponse>> {
        let mut missing = Vec::new();
        let found = {
            let manifest = self.manifest.read().await;
            let mut found = None;
            for partition in &manifest.partitions {
                let Some(entry) = partition.entries.get(key) else {
                    continue;
                };
                match self.read_entry(entry).await {
                    Ok(response) => {
                        found = Some(response);
                        break;
                    }
                    Err(e) => {
                        warn!(partition = %partition.name, key, error = %e, "Failed to read cached body, removing entry");
                        missing.push((partition.name.clone(), entry.clone()));
                    }
                }
            }
            found
        };

        for (partition, entry) in &missing {
            self.forget(partition, key, entry).await;
        }

        self.record(found.is_some());
        Ok(found)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let manifest = self.manifest.read().await;
        Ok(manifest
            .partition(partition)
            .map(|p| p.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> CacheStats {
        let manifest = self.manifest.read().await;
        CacheStats {
            partitions: manifest.partitions.len(),
            entries: manifest.partitions.iter().map(|p| p.entries.len()).sum(),
            total_size: manifest
                .partitions
                .iter()
                .flat_map(|p| p.entries.values())
                .map(|e| e.size)
                .sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
