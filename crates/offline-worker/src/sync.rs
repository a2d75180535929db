//! Background and periodic sync
//!
//! Syncing offline writes has no defined behaviour yet. `OfflineQueue` is
//! the seam where it would plug in; the shipped queue is always empty.

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::host::{ClientHost, ClientMessage};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

/// A record written while offline and waiting to reach the server
pub type QueuedRecord = Value;

#[async_trait]
pub trait OfflineQueue: Send + Sync {
    async fn pending(&self) -> Result<Vec<QueuedRecord>>;

    async fn push(&self, records: &[QueuedRecord]) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// The queue used until offline writes are specified: nothing is ever pending
#[derive(Debug, Default)]
pub struct UnspecifiedQueue;

#[async_trait]
impl OfflineQueue for UnspecifiedQueue {
    async fn pending(&self) -> Result<Vec<QueuedRecord>> {
        Ok(Vec::new())
    }

    async fn push(&self, _records: &[QueuedRecord]) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tag: String,
    pub handled: bool,
    pub synced: usize,
}

/// Run a sync for `tag`. Tags other than the configured ones are no-ops.
pub async fn run_sync(
    config: &WorkerConfig,
    queue: &dyn OfflineQueue,
    host: &dyn ClientHost,
    tag: &str,
) -> Result<SyncReport> {
    if tag != config.sync_tag && tag != config.periodic_sync_tag {
        debug!(tag, "Ignoring unknown sync tag");
        return Ok(SyncReport {
            tag: tag.to_string(),
            handled: false,
            synced: 0,
        });
    }

    let records = queue.pending().await?;
    if !records.is_empty() {
        queue.push(&records).await?;
        queue.clear().await?;
    }

    info!(tag, synced = records.len(), "Sync complete");
    host.post_message(ClientMessage::SyncComplete {
        tag: tag.to_string(),
        synced: records.len(),
    })
    .await;

    Ok(SyncReport {
        tag: tag.to_string(),
        handled: true,
        synced: records.len(),
    })
}
