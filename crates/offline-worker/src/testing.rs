//! Test doubles shared by the unit tests

use crate::error::Result;
use crate::network::{CacheMode, Network, NetworkError};
use crate::request::{FetchResponse, InterceptedRequest, ResponseKind};
use crate::sync::{OfflineQueue, QueuedRecord};
use async_trait::async_trait;
use axum::http::{header, StatusCode};
use partition_cache::{CacheStats, CachedResponse, MemoryStore, PartitionStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An in-memory origin. Unknown URLs answer 404; going offline makes
/// every fetch fail the way an unreachable network does.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
    offline: AtomicBool,
    requests: Mutex<Vec<(String, CacheMode)>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &str) {
        let response = FetchResponse::new(url, StatusCode::OK, body.as_bytes().to_vec())
            .with_header(header::CONTENT_TYPE, "text/html");
        self.serve_response(url, response);
    }

    pub fn serve_response(&self, url: &str, response: FetchResponse) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(String, CacheMode)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        cache_mode: CacheMode,
    ) -> std::result::Result<FetchResponse, NetworkError> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push((url.clone(), cache_mode));

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable(format!("offline: {url}")));
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes.get(&url).cloned().unwrap_or_else(|| {
            FetchResponse::new(url, StatusCode::NOT_FOUND, Vec::new()).with_kind(ResponseKind::Basic)
        }))
    }
}

/// An offline queue that remembers what it pushed
#[derive(Default)]
pub struct MemoryQueue {
    records: Mutex<Vec<QueuedRecord>>,
    pushed: Mutex<Vec<QueuedRecord>>,
}

impl MemoryQueue {
    pub fn with_records(records: Vec<QueuedRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            pushed: Mutex::default(),
        }
    }

    pub fn pushed(&self) -> Vec<QueuedRecord> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfflineQueue for MemoryQueue {
    async fn pending(&self) -> Result<Vec<QueuedRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn push(&self, records: &[QueuedRecord]) -> Result<()> {
        self.pushed.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.lock().unwrap().clear();
        Ok(())
    }
}

/// A memory store that can be told to fail writes for one key, or to fail
/// listing partitions
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_key: Mutex<Option<String>>,
    failing_listing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts_for(&self, key: &str) {
        *self.failing_key.lock().unwrap() = Some(key.to_string());
    }

    pub fn fail_listing(&self, failing: bool) {
        self.failing_listing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartitionStore for FlakyStore {
    async fn open(&self, partition: &str) -> partition_cache::Result<()> {
        self.inner.open(partition).await
    }

    async fn partitions(&self) -> partition_cache::Result<Vec<String>> {
        if self.failing_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("manifest unreadable".to_string()));
        }
        self.inner.partitions().await
    }

    async fn delete_partition(&self, partition: &str) -> partition_cache::Result<bool> {
        self.inner.delete_partition(partition).await
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: CachedResponse,
    ) -> partition_cache::Result<()> {
        if self.failing_key.lock().unwrap().as_deref() == Some(key) {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        self.inner.put(partition, key, response).await
    }

    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> partition_cache::Result<Option<CachedResponse>> {
        self.inner.get(partition, key).await
    }

    async fn delete(&self, partition: &str, key: &str) -> partition_cache::Result<bool> {
        self.inner.delete(partition, key).await
    }

    async fn match_any(&self, key: &str) -> partition_cache::Result<Option<CachedResponse>> {
        self.inner.match_any(key).await
    }

    async fn keys(&self, partition: &str) -> partition_cache::Result<Vec<String>> {
        self.inner.keys(partition).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}
