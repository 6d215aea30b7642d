//! Offline-resilient shopping list sync.
//!
//! Reads are served from the remote when reachable and from a local cache
//! otherwise. Writes are applied locally first; while offline they are
//! persisted in a pending queue and replayed, deduplicated, when
//! connectivity returns.
//!
//! `Store` is the entry point: construct it with a `RemoteListApi`, a
//! `KeyValueStore` and a `NetworkMonitor`.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod queue;
pub mod storage;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, RemoteListApi};
pub use cache::CacheManager;
pub use config::Config;
pub use queue::PendingQueue;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{ListState, Store, SyncStatus, WritePhase};
pub use sync::{FlushOutcome, FlushReport, NetworkMonitor, WatchMonitor};
