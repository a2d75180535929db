//! Events the host delivers to the worker, and what handling them produced

use crate::lifecycle::{ActivationReport, InstallReport};
use crate::messages::MessageOutcome;
use crate::notifications::{ClickAction, Notification};
use crate::request::{InterceptedRequest, Intercepted};
use crate::sync::SyncReport;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(InterceptedRequest),
    Sync { tag: String },
    PeriodicSync { tag: String },
    Push { data: Option<Vec<u8>> },
    NotificationClick { action: Option<String> },
    Message(Value),
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::PeriodicSync { .. } => "periodicsync",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    /// `None` leaves the request to the host's default handling
    Responded(Option<Intercepted>),
    Synced(SyncReport),
    NotificationShown(Notification),
    NotificationClicked(ClickAction),
    Message(MessageOutcome),
}
