//! Named-partition response cache
//!
//! A key/value store of request identities to copied responses, split into
//! named partitions that are created, listed and deleted wholesale. Entries
//! never expire on their own; a partition goes away only when it is deleted.

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::PartitionStore;
pub use types::{CacheStats, CachedResponse};
