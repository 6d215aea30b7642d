//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving list
//! data through a `KeyValueStore`. Data is cached as JSON and considered
//! stale after 60 minutes.
//!
//! Persisted layout:
//! - `lists:overview` - array of list summaries
//! - `lists:overview:meta` - `{ cachedAt }` for the overview
//! - `list:detail:<id>` - `{ data, cachedAt }` per list
//! - `sync:queue` - pending writes (owned by the queue module)

pub mod manager;

pub use manager::{age_display, CacheManager, CachedData};

pub const OVERVIEW_KEY: &str = "lists:overview";
pub const OVERVIEW_META_KEY: &str = "lists:overview:meta";
pub const DETAIL_KEY_PREFIX: &str = "list:detail:";
pub const QUEUE_KEY: &str = "sync:queue";

pub fn detail_key(list_id: &str) -> String {
    format!("{}{}", DETAIL_KEY_PREFIX, list_id)
}

/// True for every key written by this crate.
pub fn is_namespaced(key: &str) -> bool {
    key == OVERVIEW_KEY
        || key == OVERVIEW_META_KEY
        || key == QUEUE_KEY
        || key.starts_with(DETAIL_KEY_PREFIX)
}
