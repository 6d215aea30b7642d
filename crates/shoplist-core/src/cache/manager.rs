use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{detail_key, is_namespaced, OVERVIEW_KEY, OVERVIEW_META_KEY};
use crate::models::{ListSummary, ShoppingList};
use crate::storage::KeyValueStore;

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    #[serde(rename = "cachedAt", with = "chrono::serde::ts_milliseconds")]
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }

    pub fn is_stale(&self) -> bool {
        is_stale(self.cached_at)
    }
}

pub(crate) fn is_stale(cached_at: DateTime<Utc>) -> bool {
    (Utc::now() - cached_at).num_minutes() > CACHE_STALE_MINUTES
}

/// Human-readable age of a capture instant: "just now", "5m ago", "2h ago", "3d ago".
pub fn age_display(cached_at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - cached_at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            // Round up: 1h 30m+ becomes 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OverviewMeta {
    #[serde(rename = "cachedAt", with = "chrono::serde::ts_milliseconds")]
    cached_at: DateTime<Utc>,
}

/// Typed, best-effort cache over a `KeyValueStore`.
///
/// Nothing here returns an error to the caller: reads yield `None` on a miss
/// or on unreadable data, writes log failures. Clone is cheap and clones share
/// the background write set.
#[derive(Clone)]
pub struct CacheManager {
    kv: Arc<dyn KeyValueStore>,
    writes: Arc<Mutex<JoinSet<()>>>,
}

impl CacheManager {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            writes: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(contents) = self
            .kv
            .get(key)
            .await
            .with_context(|| format!("Failed to read cache entry: {}", key))?
        else {
            return Ok(None);
        };

        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry: {}", key))?;
        Ok(Some(value))
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string(value)?;
        self.kv
            .set(key, contents)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", key))?;
        Ok(())
    }

    /// Load and treat any failure as a miss.
    async fn load_or_miss<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.load(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(cache = key, error = %format!("{:#}", e), "Discarding unreadable cache entry");
                None
            }
        }
    }

    // ===== Overview =====

    pub async fn cache_lists(&self, lists: &[ListSummary]) {
        let result = async {
            self.save(OVERVIEW_KEY, lists).await?;
            self.save(OVERVIEW_META_KEY, &OverviewMeta { cached_at: Utc::now() })
                .await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %format!("{:#}", e), "Failed to cache list overview");
        }
    }

    pub async fn get_cached_lists(&self) -> Option<Vec<ListSummary>> {
        self.load_or_miss(OVERVIEW_KEY).await
    }

    /// Overview with its capture time, when both are readable.
    pub async fn get_cached_lists_with_age(&self) -> Option<CachedData<Vec<ListSummary>>> {
        let data = self.get_cached_lists().await?;
        let meta: OverviewMeta = self.load_or_miss(OVERVIEW_META_KEY).await?;
        Some(CachedData {
            data,
            cached_at: meta.cached_at,
        })
    }

    /// Age of the cached overview for display, e.g. "15m ago".
    pub async fn overview_age(&self) -> Option<String> {
        let meta: OverviewMeta = self.load_or_miss(OVERVIEW_META_KEY).await?;
        Some(age_display(meta.cached_at))
    }

    // ===== List Detail =====

    pub async fn cache_list_detail(&self, list: &ShoppingList) {
        let key = detail_key(&list.id);
        if let Err(e) = self.save(&key, &CachedData::new(list)).await {
            warn!(list_id = %list.id, error = %format!("{:#}", e), "Failed to cache list detail");
        }
    }

    pub async fn get_cached_list_detail(&self, list_id: &str) -> Option<CachedData<ShoppingList>> {
        self.load_or_miss(&detail_key(list_id)).await
    }

    // ===== Background writes =====

    fn lock_writes(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_write<F>(&self, write: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut writes = self.lock_writes();
        // Reap finished writes so the set stays small
        while writes.try_join_next().is_some() {}
        writes.spawn(write);
    }

    /// Cache the overview without waiting for the write.
    pub fn spawn_cache_lists(&self, lists: Vec<ListSummary>) {
        let cache = self.clone();
        self.spawn_write(async move { cache.cache_lists(&lists).await });
    }

    /// Cache a list detail without waiting for the write.
    pub fn spawn_cache_list_detail(&self, list: ShoppingList) {
        let cache = self.clone();
        self.spawn_write(async move { cache.cache_list_detail(&list).await });
    }

    /// Wait for every background write started so far.
    pub async fn settle(&self) {
        loop {
            let mut writes = std::mem::take(&mut *self.lock_writes());
            if writes.is_empty() {
                return;
            }
            while let Some(result) = writes.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background cache write did not complete");
                }
            }
        }
    }

    // ===== Maintenance =====

    /// Remove every key this crate owns: overview, all details and the sync queue.
    pub async fn clear_all(&self) {
        self.settle().await;
        let keys = match self.kv.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate cache keys");
                return;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter(|k| is_namespaced(k)) {
            match self.kv.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(cache = %key, error = %e, "Failed to remove cache entry"),
            }
        }
        debug!(removed, "Cleared cache");
    }
}
