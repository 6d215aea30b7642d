//! List state store.
//!
//! `Store` owns the in-memory list state shown by the UI and coordinates the
//! cache, the pending-write queue and the sync engine. It is constructed with
//! its collaborators (remote API, persistent store, network monitor) so tests
//! can substitute fakes.
//!
//! Writes follow the toggle-purchased state machine:
//!
//! ```text
//! Idle -> Optimistic -> OnlineCommit  -> Committed
//!                    \              \-> OfflineQueued (network failure)
//!                     \-> OfflineQueued -> Committed (by a later flush)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{classify, ErrorClass, RemoteListApi};
use crate::cache::{age_display, manager::is_stale, CacheManager};
use crate::models::{ListSummary, Operation, ShoppingList};
use crate::queue::{deduplicate_queue, PendingQueue};
use crate::storage::KeyValueStore;
use crate::sync::{
    apply_operation_to_cache, project, Connectivity, ConnectivityEdge, FlushOutcome,
    NetworkMonitor, SyncEngine,
};

/// Phases of a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Idle,
    /// Applied to in-memory state, nothing sent yet.
    Optimistic,
    /// Remote update in flight.
    OnlineCommit,
    /// Persisted in the queue and applied to the cache.
    OfflineQueued,
    /// Confirmed by the remote.
    Committed,
}

/// What the UI renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListState {
    pub lists: Vec<ListSummary>,
    /// The list currently on screen.
    pub current: Option<ShoppingList>,
    pub pending_sync: bool,
    /// Message for a toast/alert; cleared by `take_error`.
    pub last_error: Option<String>,
    /// Capture time of cached data on screen, None when showing remote data.
    pub serving_cache_since: Option<DateTime<Utc>>,
}

/// Indicator inputs: offline banner, syncing spinner, staleness notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub pending_sync: bool,
    pub pending_count: usize,
    pub stale_notice: Option<String>,
    pub last_error: Option<String>,
}

pub struct Store {
    api: Arc<dyn RemoteListApi>,
    cache: CacheManager,
    queue: PendingQueue,
    engine: SyncEngine,
    monitor: Arc<dyn NetworkMonitor>,
    state: RwLock<ListState>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    pub fn new(
        api: Arc<dyn RemoteListApi>,
        kv: Arc<dyn KeyValueStore>,
        monitor: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let cache = CacheManager::new(kv.clone());
        let queue = PendingQueue::new(kv);
        let engine = SyncEngine::new(api.clone(), queue.clone());
        Self {
            api,
            cache,
            queue,
            engine,
            monitor,
            state: RwLock::new(ListState::default()),
            watcher: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    fn lock_watcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Lifecycle =====

    /// Flush writes left over from a previous run, then start reacting to
    /// reconnects.
    pub async fn start(self: &Arc<Self>) {
        // Subscribe first so a reconnect during the initial flush is not missed
        let rx = self.monitor.subscribe();
        let initial = *rx.borrow();

        let pending = self.queue.len().await;
        self.state.write().await.pending_sync = pending > 0;
        if pending > 0 {
            info!(pending, "Found pending writes from a previous session");
            self.flush().await;
        }

        let handle = tokio::spawn(watch_connectivity(Arc::downgrade(self), rx, initial));
        if let Some(previous) = self.lock_watcher().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the connectivity watcher and wait for background cache writes.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.lock_watcher().take() {
            handle.abort();
        }
        self.cache.settle().await;
    }

    /// Drop all local data, e.g. on logout or account switch.
    pub async fn logout(&self) {
        *self.state.write().await = ListState::default();
        self.cache.clear_all().await;
        info!("Cleared local list data");
    }

    // ===== Reads =====

    pub async fn state(&self) -> ListState {
        self.state.read().await.clone()
    }

    pub async fn current_list(&self) -> Option<ShoppingList> {
        self.state.read().await.current.clone()
    }

    pub async fn take_error(&self) -> Option<String> {
        self.state.write().await.last_error.take()
    }

    pub async fn status(&self) -> SyncStatus {
        let pending_count = self.queue.len().await;
        let state = self.state.read().await;
        SyncStatus {
            online: self.monitor.is_online(),
            syncing: self.engine.is_flushing(),
            pending_sync: state.pending_sync,
            pending_count,
            stale_notice: state
                .serving_cache_since
                .filter(|cached_at| is_stale(*cached_at))
                .map(|cached_at| format!("Last updated {}", age_display(cached_at))),
            last_error: state.last_error.clone(),
        }
    }

    /// Load the overview from the remote, falling back to the cache when
    /// offline or unreachable.
    pub async fn load_lists(&self) -> Result<Vec<ListSummary>> {
        if self.monitor.is_online() {
            match self.api.fetch_lists().await {
                Ok(lists) => {
                    self.cache.spawn_cache_lists(lists.clone());
                    let mut state = self.state.write().await;
                    state.lists = lists.clone();
                    state.serving_cache_since = None;
                    return Ok(lists);
                }
                Err(e) if classify(&e) == ErrorClass::Network => {
                    warn!(error = %format!("{:#}", e), "Lists unreachable, serving cache");
                }
                Err(e) => return Err(self.surface(e, "Failed to load lists").await),
            }
        }

        let cached = self
            .cache
            .get_cached_lists_with_age()
            .await
            .ok_or_else(|| anyhow!("Lists are not available offline"))?;
        let mut state = self.state.write().await;
        state.lists = cached.data.clone();
        state.serving_cache_since = Some(cached.cached_at);
        Ok(cached.data)
    }

    /// Load a list detail and put it on screen. Queued writes are re-applied
    /// on top of whatever was loaded.
    pub async fn open_list(&self, list_id: &str) -> Result<ShoppingList> {
        if self.monitor.is_online() {
            match self.api.fetch_list_detail(list_id).await {
                Ok(mut list) => {
                    self.overlay_pending(&mut list).await;
                    self.cache.spawn_cache_list_detail(list.clone());
                    self.show(list.clone(), None).await;
                    return Ok(list);
                }
                Err(e) if classify(&e) == ErrorClass::Network => {
                    warn!(list_id, error = %format!("{:#}", e), "List unreachable, serving cache");
                }
                Err(e) => return Err(self.surface(e, "Failed to load list").await),
            }
        }

        let cached = self
            .cache
            .get_cached_list_detail(list_id)
            .await
            .ok_or_else(|| anyhow!("List {} is not available offline", list_id))?;
        let mut list = cached.data;
        self.overlay_pending(&mut list).await;
        self.show(list.clone(), Some(cached.cached_at)).await;
        Ok(list)
    }

    /// Fetch and cache every list so the app is usable offline. Returns the
    /// number of details cached.
    pub async fn warm_cache(&self) -> Result<usize> {
        if !self.monitor.is_online() {
            bail!("Cannot download lists while offline");
        }
        let lists = self.api.fetch_lists().await.context("Failed to fetch lists")?;
        self.cache.cache_lists(&lists).await;

        let details = join_all(lists.iter().map(|l| self.api.fetch_list_detail(&l.id))).await;
        let mut cached = 0;
        for (summary, result) in lists.iter().zip(details) {
            match result {
                Ok(mut list) => {
                    self.overlay_pending(&mut list).await;
                    self.cache.cache_list_detail(&list).await;
                    cached += 1;
                }
                Err(e) => {
                    warn!(list_id = %summary.id, error = %format!("{:#}", e), "Failed to fetch list for offline use")
                }
            }
        }
        info!(lists = lists.len(), cached, "Prepared offline copy");
        self.state.write().await.lists = lists;
        Ok(cached)
    }

    // ===== Writes =====

    /// Flip an item's purchased flag. The in-memory state changes before any
    /// I/O and is never rolled back; the returned phase says whether the
    /// remote confirmed it or it was queued.
    pub async fn toggle_purchased(&self, list_id: &str, item_id: &str) -> Result<WritePhase> {
        let purchased = self.flip_in_memory(list_id, item_id).await?;
        let operation = Operation::TogglePurchased { purchased };
        debug!(list_id, item_id, purchased, phase = ?WritePhase::Optimistic, "Applied locally");

        if self.monitor.is_online() {
            debug!(list_id, item_id, phase = ?WritePhase::OnlineCommit, "Sending update");
            // Only entries queued before this write are older than it
            let older = self.queued_for_slot(list_id, item_id, &operation).await;
            match self.api.update_item(list_id, item_id, &operation.patch()).await {
                Ok(_) => {
                    self.discard_superseded(list_id, item_id, &older).await;
                    self.refresh_list(list_id).await;
                    debug!(list_id, item_id, phase = ?WritePhase::Committed, "Update confirmed");
                    return Ok(WritePhase::Committed);
                }
                Err(e) if classify(&e) == ErrorClass::Network => {
                    warn!(list_id, item_id, error = %format!("{:#}", e), "Update failed, queueing for later");
                }
                Err(e) => return Err(self.surface(e, "Failed to update item").await),
            }
        }

        self.queue_write(list_id, item_id, operation).await?;
        debug!(list_id, item_id, phase = ?WritePhase::OfflineQueued, "Queued for sync");
        Ok(WritePhase::OfflineQueued)
    }

    /// Drain the queue if online, then reconcile the displayed list.
    pub async fn flush(&self) -> FlushOutcome {
        if !self.monitor.is_online() {
            debug!("Offline, not flushing");
            return FlushOutcome::Skipped;
        }

        let outcome = self.engine.flush().await;
        if let FlushOutcome::Completed(ref report) = outcome {
            let displayed = {
                let mut state = self.state.write().await;
                state.pending_sync = report.remaining > 0;
                if report.halted == Some(ErrorClass::Other) {
                    state.last_error = Some("Some changes could not be synced".to_string());
                }
                state.current.as_ref().map(|list| list.id.clone())
            };
            if let Some(list_id) = displayed.filter(|id| report.affected_lists.contains(id)) {
                self.refresh_list(&list_id).await;
            }
        }
        outcome
    }

    // ===== Internals =====

    /// Returns the new purchased value.
    async fn flip_in_memory(&self, list_id: &str, item_id: &str) -> Result<bool> {
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if let Some(current) = state.current.as_mut().filter(|c| c.id == list_id) {
                let item = current
                    .item_mut(item_id)
                    .ok_or_else(|| anyhow!("Item {} not found in list {}", item_id, list_id))?;
                item.purchased = !item.purchased;
                let purchased = item.purchased;
                replace_summary(&mut state.lists, current.summary());
                return Ok(purchased);
            }
        }

        // Not on screen: derive the new value from the cached copy
        let cached = self
            .cache
            .get_cached_list_detail(list_id)
            .await
            .ok_or_else(|| anyhow!("List {} is not loaded", list_id))?;
        let item = cached
            .data
            .item(item_id)
            .ok_or_else(|| anyhow!("Item {} not found in list {}", item_id, list_id))?;
        Ok(!item.purchased)
    }

    async fn queue_write(&self, list_id: &str, item_id: &str, operation: Operation) -> Result<()> {
        let op = match self.queue.enqueue(list_id, item_id, operation).await {
            Ok(op) => op,
            Err(e) => {
                return Err(self
                    .surface(e.into(), "Could not save change for later sync")
                    .await)
            }
        };
        apply_operation_to_cache(&self.cache, &op).await;
        self.state.write().await.pending_sync = true;
        Ok(())
    }

    async fn queued_for_slot(&self, list_id: &str, item_id: &str, operation: &Operation) -> Vec<String> {
        self.queue
            .get_queue()
            .await
            .into_iter()
            .filter(|op| {
                op.list_id == list_id
                    && op.item_id == item_id
                    && op.operation.kind() == operation.kind()
            })
            .map(|op| op.id)
            .collect()
    }

    /// A confirmed online write makes the queued writes it was issued after
    /// obsolete. Entries queued while it was in flight are newer and stay.
    async fn discard_superseded(&self, list_id: &str, item_id: &str, older: &[String]) {
        if older.is_empty() {
            return;
        }
        match self.queue.dequeue_many(older).await {
            Ok(()) => {
                let remaining = self.queue.len().await;
                self.state.write().await.pending_sync = remaining > 0;
            }
            Err(e) => warn!(list_id, item_id, error = %e, "Failed to discard superseded writes"),
        }
    }

    /// Re-fetch a list, cache it, and replace it on screen if displayed.
    async fn refresh_list(&self, list_id: &str) {
        match self.api.fetch_list_detail(list_id).await {
            Ok(mut list) => {
                self.overlay_pending(&mut list).await;
                self.cache.spawn_cache_list_detail(list.clone());
                let mut state = self.state.write().await;
                replace_summary(&mut state.lists, list.summary());
                if state.current.as_ref().is_some_and(|c| c.id == list.id) {
                    state.current = Some(list);
                    state.serving_cache_since = None;
                }
            }
            Err(e) => {
                warn!(list_id, error = %format!("{:#}", e), "Failed to refresh list");
            }
        }
    }

    async fn overlay_pending(&self, list: &mut ShoppingList) -> usize {
        let queue = self.queue.get_queue().await;
        deduplicate_queue(&queue)
            .iter()
            .filter(|op| project(op, list))
            .count()
    }

    async fn show(&self, list: ShoppingList, serving_cache_since: Option<DateTime<Utc>>) {
        let mut state = self.state.write().await;
        replace_summary(&mut state.lists, list.summary());
        state.current = Some(list);
        state.serving_cache_since = serving_cache_since;
    }

    /// Record an error for the UI and return it with context.
    async fn surface(&self, err: anyhow::Error, action: &str) -> anyhow::Error {
        warn!(error = %format!("{:#}", err), "{}", action);
        self.state.write().await.last_error = Some(format!("{}: {}", action, err));
        err.context(action.to_string())
    }
}

fn replace_summary(lists: &mut [ListSummary], summary: ListSummary) {
    if let Some(entry) = lists.iter_mut().find(|l| l.id == summary.id) {
        *entry = summary;
    }
}

/// Flush on every offline -> online edge until the store is dropped.
async fn watch_connectivity(
    store: Weak<Store>,
    mut rx: watch::Receiver<Connectivity>,
    initial: Connectivity,
) {
    let mut edge = ConnectivityEdge::new(initial);
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        if !edge.observe(state) {
            continue;
        }
        let Some(store) = store.upgrade() else {
            break;
        };
        info!("Connectivity restored, flushing pending writes");
        store.flush().await;
    }
    debug!("Connectivity watcher stopped");
}
