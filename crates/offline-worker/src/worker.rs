//! The worker: routes each host event to its handler

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::events::{EventOutcome, WorkerEvent};
use crate::host::ClientHost;
use crate::interceptor::FetchInterceptor;
use crate::lifecycle::{self, ActivationReport, InstallReport, WorkerState};
use crate::messages::{self, Command, MessageOutcome};
use crate::network::Network;
use crate::notifications::{self, PUSH_TAG};
use crate::sync::{self, OfflineQueue, UnspecifiedQueue};
use chrono::{DateTime, Utc};
use partition_cache::PartitionStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    store: Arc<dyn PartitionStore>,
    network: Arc<dyn Network>,
    host: Arc<dyn ClientHost>,
    queue: Arc<dyn OfflineQueue>,
    interceptor: FetchInterceptor,
    state: RwLock<WorkerState>,
    pub started_at: DateTime<Utc>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn PartitionStore>,
        network: Arc<dyn Network>,
        host: Arc<dyn ClientHost>,
    ) -> Self {
        let config = Arc::new(config);
        let interceptor = FetchInterceptor::new(config.clone(), store.clone(), network.clone());
        Self {
            config,
            store,
            network,
            host,
            queue: Arc::new(UnspecifiedQueue),
            interceptor,
            state: RwLock::new(WorkerState::Parsed),
            started_at: Utc::now(),
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn OfflineQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn PartitionStore {
        self.store.as_ref()
    }

    pub fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        debug!(?state, "Worker state changed");
        *self.state.write().await = state;
    }

    /// Install, then activate straight away
    pub async fn start(&self) -> Result<(InstallReport, ActivationReport)> {
        let installed = match self.handle(WorkerEvent::Install).await? {
            EventOutcome::Installed(report) => report,
            other => return Err(WorkerError::Install(format!("unexpected outcome {:?}", other))),
        };
        let activated = match self.handle(WorkerEvent::Activate).await? {
            EventOutcome::Activated(report) => report,
            other => return Err(WorkerError::Install(format!("unexpected outcome {:?}", other))),
        };
        Ok((installed, activated))
    }

    /// Handle one event. The returned future settles only once all work
    /// the event started has finished.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome> {
        debug!(event = event.name(), "Handling event");

        match event {
            WorkerEvent::Install => {
                self.set_state(WorkerState::Installing).await;
                match lifecycle::install(
                    &self.config,
                    self.store.as_ref(),
                    self.network.as_ref(),
                    self.host.as_ref(),
                )
                .await
                {
                    Ok(report) => {
                        self.set_state(WorkerState::Installed).await;
                        Ok(EventOutcome::Installed(report))
                    }
                    Err(e) => {
                        error!(error = %e, "Install failed");
                        self.set_state(WorkerState::Redundant).await;
                        Err(e)
                    }
                }
            }
            WorkerEvent::Activate => {
                if self.state().await == WorkerState::Redundant {
                    return Err(WorkerError::Install(
                        "cannot activate a redundant worker".to_string(),
                    ));
                }
                self.set_state(WorkerState::Activating).await;
                match lifecycle::activate(&self.config, self.store.as_ref(), self.host.as_ref())
                    .await
                {
                    Ok(report) => {
                        self.set_state(WorkerState::Activated).await;
                        info!(deleted = ?report.deleted, guard_blocked = report.guard_blocked, "Activated");
                        Ok(EventOutcome::Activated(report))
                    }
                    Err(e) => {
                        // Installed content is intact, so activation can be retried
                        error!(error = %e, "Activation failed");
                        self.set_state(WorkerState::Installed).await;
                        Err(e)
                    }
                }
            }
            WorkerEvent::Fetch(request) => {
                // Only an active worker controls fetches
                if self.state().await != WorkerState::Activated {
                    return Ok(EventOutcome::Responded(None));
                }
                let response = self.interceptor.handle(&request).await?;
                Ok(EventOutcome::Responded(response))
            }
            WorkerEvent::Sync { tag } | WorkerEvent::PeriodicSync { tag } => {
                let report =
                    sync::run_sync(&self.config, self.queue.as_ref(), self.host.as_ref(), &tag)
                        .await?;
                Ok(EventOutcome::Synced(report))
            }
            WorkerEvent::Push { data } => {
                let notification = notifications::push_notification(&self.config, data.as_deref());
                self.host.show_notification(notification.clone()).await;
                Ok(EventOutcome::NotificationShown(notification))
            }
            WorkerEvent::NotificationClick { action } => {
                self.host.close_notification(PUSH_TAG).await;
                let click = notifications::click_action(&self.config, action.as_deref())?;
                if let Some(url) = notifications::click_target(&click) {
                    self.host.open_window(&url).await;
                }
                Ok(EventOutcome::NotificationClicked(click))
            }
            WorkerEvent::Message(message) => {
                let outcome = match Command::parse(&message) {
                    Some(Command::SkipWaiting) => {
                        self.host.skip_waiting().await;
                        MessageOutcome::SkippedWaiting
                    }
                    Some(Command::ClearCache) => {
                        messages::clear_app_partitions(
                            &self.config,
                            self.store.as_ref(),
                            self.host.as_ref(),
                        )
                        .await?
                    }
                    Some(Command::CacheUrls { urls }) => {
                        messages::cache_urls(
                            &self.config,
                            self.store.as_ref(),
                            self.network.as_ref(),
                            &urls,
                        )
                        .await?
                    }
                    None => MessageOutcome::Ignored,
                };
                Ok(EventOutcome::Message(outcome))
            }
        }
    }
}
