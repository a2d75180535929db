//! Offline Worker Library
//!
//! An offline-first caching worker for a single-page app: precaches the app
//! shell on install, answers fetches from versioned cache partitions, and
//! relays push, sync and client-message events.

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod messages;
pub mod network;
pub mod notifications;
pub mod policy;
pub mod request;
pub mod server;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{FetchStrategy, InstallPolicy, WorkerConfig};
pub use error::{Result, WorkerError};
pub use events::{EventOutcome, WorkerEvent};
pub use host::{ClientHost, ClientMessage, LocalHost};
pub use network::{HttpNetwork, Network, NetworkError};
pub use server::{create_router, start_server, SharedState};
pub use worker::ServiceWorker;
