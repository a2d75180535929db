//! Install and activate: precaching the app shell and sweeping stale partitions

use crate::config::{InstallPolicy, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::host::ClientHost;
use crate::network::{CacheMode, Network};
use crate::request::{cache_key, FetchResponse, InterceptedRequest};
use futures::future::join_all;
use partition_cache::{CachedResponse, PartitionStore};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this instance will never control clients
    Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub partition: String,
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    /// The app shell was missing, so no partition was deleted
    pub guard_blocked: bool,
}

/// Fetch a URL that must come back with a 2xx status
pub(crate) async fn fetch_asset(network: &dyn Network, url: &Url) -> Result<FetchResponse> {
    let request = InterceptedRequest::get(url.clone());
    let response = network.fetch(&request, CacheMode::Default).await?;
    if !response.status.is_success() {
        return Err(WorkerError::Asset(format!(
            "{} returned status {}",
            url, response.status
        )));
    }
    Ok(response)
}

/// Precache the configured assets into the static partition, then ask the
/// host to activate this instance straight away.
pub async fn install(
    config: &WorkerConfig,
    store: &dyn PartitionStore,
    network: &dyn Network,
    host: &dyn ClientHost,
) -> Result<InstallReport> {
    let partition = config.static_partition();
    let urls = config.precache_urls()?;

    info!(partition = %partition, assets = urls.len(), policy = ?config.install_policy, "Installing");

    let fetched = join_all(urls.iter().map(|url| async move {
        let result = fetch_asset(network, url).await;
        (url, result)
    }))
    .await;

    let mut cached = Vec::new();
    let mut failed = Vec::new();

    match config.install_policy {
        InstallPolicy::Atomic => {
            let mut responses = Vec::with_capacity(fetched.len());
            for (url, result) in fetched {
                match result {
                    Ok(response) => responses.push((url, response)),
                    Err(e) => return Err(WorkerError::Install(e.to_string())),
                }
            }

            let existed = store.has_partition(&partition).await?;
            store.open(&partition).await?;

            // Entries this run replaced, so a failed write can restore them
            let mut written: Vec<(String, Option<CachedResponse>)> = Vec::new();
            for (url, response) in responses {
                let key = cache_key(url);
                let stored: partition_cache::Result<()> = async {
                    let previous = store.get(&partition, &key).await?;
                    written.push((key.clone(), previous));
                    store.put(&partition, &key, response.to_cached()).await
                }
                .await;

                if let Err(e) = stored {
                    roll_back(store, &partition, existed, written).await;
                    return Err(WorkerError::Install(format!("{}: {}", url, e)));
                }
                cached.push(url.to_string());
            }
        }
        InstallPolicy::BestEffort => {
            store.open(&partition).await?;
            for (url, result) in fetched {
                let stored: Result<()> = match result {
                    Ok(response) => store
                        .put(&partition, &cache_key(url), response.to_cached())
                        .await
                        .map_err(Into::into),
                    Err(e) => Err(e),
                };
                match stored {
                    Ok(()) => cached.push(url.to_string()),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to precache asset");
                        failed.push(url.to_string());
                    }
                }
            }
        }
    }

    info!(cached = cached.len(), failed = failed.len(), "Install complete");
    host.skip_waiting().await;

    Ok(InstallReport {
        partition,
        cached,
        failed,
    })
}

/// Undo an aborted atomic install. A partition this run created is removed
/// outright; otherwise only the entries it wrote are put back.
async fn roll_back(
    store: &dyn PartitionStore,
    partition: &str,
    existed: bool,
    written: Vec<(String, Option<CachedResponse>)>,
) {
    if !existed {
        if let Err(e) = store.delete_partition(partition).await {
            warn!(partition, error = %e, "Failed to remove partition after aborted install");
        }
        return;
    }

    for (key, previous) in written.into_iter().rev() {
        let restored = match previous {
            Some(previous) => store.put(partition, &key, previous).await,
            None => store.delete(partition, &key).await.map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(partition, key = %key, error = %e, "Failed to roll back precached asset");
        }
    }
}

/// Delete every partition that is not one of the current two, then take
/// control of all open clients.
pub async fn activate(
    config: &WorkerConfig,
    store: &dyn PartitionStore,
    host: &dyn ClientHost,
) -> Result<ActivationReport> {
    let current = [config.static_partition(), config.dynamic_partition()];

    if config.activation_guard {
        let shell = cache_key(&config.app_shell_url()?);
        if store.get(&current[0], &shell).await?.is_none() {
            warn!(
                partition = %current[0],
                app_shell = %shell,
                "App shell not precached, keeping old partitions"
            );
            host.claim().await;
            return Ok(ActivationReport {
                deleted: Vec::new(),
                kept: store.partitions().await?,
                guard_blocked: true,
            });
        }
    }

    let mut deleted = Vec::new();
    let mut kept = Vec::new();
    for partition in store.partitions().await? {
        if current.contains(&partition) {
            kept.push(partition);
        } else if store.delete_partition(&partition).await? {
            info!(partition = %partition, "Deleted stale partition");
            deleted.push(partition);
        }
    }

    host.claim().await;

    Ok(ActivationReport {
        deleted,
        kept,
        guard_blocked: false,
    })
}
