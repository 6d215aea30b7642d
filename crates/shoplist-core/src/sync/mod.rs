//! Offline sync: optimistic cache projection, queue flush and connectivity.

pub mod apply;
pub mod engine;
pub mod monitor;

pub use apply::{apply_operation_to_cache, project};
pub use engine::{FlushOutcome, FlushReport, SyncEngine};
pub use monitor::{Connectivity, ConnectivityEdge, NetworkMonitor, WatchMonitor};
