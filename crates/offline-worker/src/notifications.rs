//! Push notification payloads and click handling

use crate::config::WorkerConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_PUSH_BODY: &str = "New content available";
pub const PUSH_TAG: &str = "push";

/// Action id that opens the app from a notification
pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub date_of_arrival: DateTime<Utc>,
    pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// What a notification click asks the host to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickAction {
    OpenApp { url: String },
    Dismiss,
}

/// Build the notification shown for a push message. The payload is shown
/// as-is; anything that is not UTF-8 is replaced lossily.
pub fn push_notification(config: &WorkerConfig, payload: Option<&[u8]>) -> Notification {
    let body = payload
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string());

    let icon = format!("{}icons/icon-192x192.png", config.base_path);

    Notification {
        title: config.app_name.clone(),
        body,
        icon: icon.clone(),
        badge: format!("{}icons/icon-72x72.png", config.base_path),
        tag: PUSH_TAG.to_string(),
        vibrate: vec![100, 50, 100],
        data: NotificationData {
            date_of_arrival: Utc::now(),
            primary_key: 1,
        },
        actions: vec![
            NotificationAction {
                action: EXPLORE_ACTION.to_string(),
                title: "Open app".to_string(),
                icon: icon.clone(),
            },
            NotificationAction {
                action: CLOSE_ACTION.to_string(),
                title: "Close".to_string(),
                icon,
            },
        ],
    }
}

pub fn click_action(config: &WorkerConfig, action: Option<&str>) -> Result<ClickAction> {
    match action {
        Some(EXPLORE_ACTION) => Ok(ClickAction::OpenApp {
            url: config.scope_url()?.to_string(),
        }),
        _ => Ok(ClickAction::Dismiss),
    }
}

/// The URL to open for a click, if any
pub fn click_target(action: &ClickAction) -> Option<Url> {
    match action {
        ClickAction::OpenApp { url } => Url::parse(url).ok(),
        ClickAction::Dismiss => None,
    }
}
