//! The worker's view of its host: client pages, notifications and
//! lifecycle signals

use crate::notifications::Notification;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use url::Url;

/// Messages the worker posts to every open client page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncComplete { tag: String, synced: usize },
    CacheCleared { partitions: Vec<String> },
}

#[async_trait]
pub trait ClientHost: Send + Sync {
    async fn show_notification(&self, notification: Notification);

    async fn close_notification(&self, tag: &str);

    /// Open or focus a window on `url`
    async fn open_window(&self, url: &Url);

    /// Post a message to every controlled client
    async fn post_message(&self, message: ClientMessage);

    /// Activate without waiting for older instances to release their clients
    async fn skip_waiting(&self);

    /// Take control of every open client without a reload
    async fn claim(&self);
}

/// In-process host. Notifications and windows are recorded so they can be
/// inspected; client messages are fanned out over a broadcast channel.
pub struct LocalHost {
    notifications: RwLock<Vec<Notification>>,
    windows: RwLock<Vec<Url>>,
    messages: broadcast::Sender<ClientMessage>,
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl LocalHost {
    pub fn new() -> Self {
        let (messages, _) = broadcast::channel(64);
        Self {
            notifications: RwLock::new(Vec::new()),
            windows: RwLock::new(Vec::new()),
            messages,
            skip_waiting: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    /// Listen for messages posted to clients
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.messages.subscribe()
    }

    /// Notifications currently on display
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    pub async fn windows(&self) -> Vec<Url> {
        self.windows.read().await.clone()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientHost for LocalHost {
    async fn show_notification(&self, notification: Notification) {
        info!(title = %notification.title, tag = %notification.tag, "Showing notification");
        let mut shown = self.notifications.write().await;
        shown.retain(|n| n.tag != notification.tag);
        shown.push(notification);
    }

    async fn close_notification(&self, tag: &str) {
        self.notifications.write().await.retain(|n| n.tag != tag);
    }

    async fn open_window(&self, url: &Url) {
        info!(url = %url, "Opening client window");
        let mut windows = self.windows.write().await;
        if !windows.contains(url) {
            windows.push(url.clone());
        }
    }

    async fn post_message(&self, message: ClientMessage) {
        // No open clients is not an error
        let receivers = self.messages.send(message).unwrap_or(0);
        debug!(receivers, "Posted client message");
    }

    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim(&self) {
        self.claimed.store(true, Ordering::SeqCst);
    }
}
