//! Commands posted to the worker by client pages

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::host::{ClientHost, ClientMessage};
use crate::lifecycle::fetch_asset;
use crate::network::Network;
use crate::request::cache_key;
use partition_cache::PartitionStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SkipWaiting,
    ClearCache,
    CacheUrls { urls: Vec<String> },
}

impl Command {
    /// Anything that is not a well-formed command is ignored
    pub fn parse(message: &Value) -> Option<Self> {
        match serde_json::from_value(message.clone()) {
            Ok(command) => Some(command),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognised message");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    SkippedWaiting,
    CacheCleared { partitions: Vec<String> },
    UrlsCached { cached: Vec<String>, failed: Vec<String> },
    Ignored,
}

/// Delete every partition in the app's namespace, whatever its version
pub async fn clear_app_partitions(
    config: &WorkerConfig,
    store: &dyn PartitionStore,
    host: &dyn ClientHost,
) -> Result<MessageOutcome> {
    let mut deleted = Vec::new();
    for partition in store.partitions().await? {
        if config.owns_partition(&partition) && store.delete_partition(&partition).await? {
            deleted.push(partition);
        }
    }

    info!(partitions = ?deleted, "Cleared app caches");
    host.post_message(ClientMessage::CacheCleared {
        partitions: deleted.clone(),
    })
    .await;

    Ok(MessageOutcome::CacheCleared {
        partitions: deleted,
    })
}

/// Fetch and store each URL in the dynamic partition, skipping failures
pub async fn cache_urls(
    config: &WorkerConfig,
    store: &dyn PartitionStore,
    network: &dyn Network,
    urls: &[String],
) -> Result<MessageOutcome> {
    let partition = config.dynamic_partition();
    store.open(&partition).await?;

    let mut cached = Vec::new();
    let mut failed = Vec::new();

    for raw in urls {
        let url = match config.resolve(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %raw, error = %e, "Skipping unparseable URL");
                failed.push(raw.clone());
                continue;
            }
        };

        let stored: Result<()> = match fetch_asset(network, &url).await {
            Ok(response) => store
                .put(&partition, &cache_key(&url), response.to_cached())
                .await
                .map_err(Into::into),
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => cached.push(url.to_string()),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to cache URL");
                failed.push(raw.clone());
            }
        }
    }

    Ok(MessageOutcome::UrlsCached { cached, failed })
}
