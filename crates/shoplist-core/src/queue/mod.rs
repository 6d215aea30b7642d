//! Persisted queue of writes awaiting remote confirmation.
//!
//! The queue lives under `sync:queue` as a JSON array of `PendingOperation`.
//! It is append-only until entries are dequeued by a successful flush, and it
//! is read back verbatim after a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::QUEUE_KEY;
use crate::models::{Operation, PendingOperation};
use crate::storage::{KeyValueStore, StorageError, StorageResult};

/// Queue handle. Clones share the same lock, so read-modify-write cycles from
/// different handles never interleave.
#[derive(Clone)]
pub struct PendingQueue {
    kv: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl PendingQueue {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// All queued operations in enqueue order. An unreadable queue is logged
    /// and treated as empty.
    pub async fn get_queue(&self) -> Vec<PendingOperation> {
        match self.read().await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "Failed to read sync queue, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.get_queue().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stamp the operation with a fresh id and the current instant, then append it.
    pub async fn enqueue(
        &self,
        list_id: &str,
        item_id: &str,
        operation: Operation,
    ) -> StorageResult<PendingOperation> {
        let _guard = self.lock.lock().await;
        let mut queue = self.read_for_update().await?;
        let op = PendingOperation::new(new_operation_id(), list_id, item_id, operation, Utc::now());
        queue.push(op.clone());
        self.write(&queue).await?;
        debug!(op_id = %op.id, list_id, item_id, kind = op.operation.kind(), queued = queue.len(), "Enqueued operation");
        Ok(op)
    }

    /// Remove the operation with the given id. Unknown ids are ignored.
    pub async fn dequeue(&self, id: &str) -> StorageResult<()> {
        self.dequeue_many(&[id.to_string()]).await
    }

    pub async fn dequeue_many(&self, ids: &[String]) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut queue = self.read_for_update().await?;
        let before = queue.len();
        queue.retain(|op| !ids.contains(&op.id));
        if queue.len() != before {
            self.write(&queue).await?;
        }
        Ok(())
    }

    pub async fn clear_queue(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        self.kv.remove(QUEUE_KEY).await
    }

    async fn read(&self) -> StorageResult<Vec<PendingOperation>> {
        match self.kv.get(QUEUE_KEY).await? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(Vec::new()),
        }
    }

    /// Read ahead of a rewrite. A corrupt document is replaced, but a failed
    /// read is returned so the rewrite cannot overwrite entries it never saw.
    async fn read_for_update(&self) -> StorageResult<Vec<PendingOperation>> {
        match self.read().await {
            Err(StorageError::Serialization(e)) => {
                warn!(error = %e, "Sync queue is corrupt, starting a new one");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn write(&self, queue: &[PendingOperation]) -> StorageResult<()> {
        self.kv.set(QUEUE_KEY, serde_json::to_string(queue)?).await
    }
}

/// `<epoch millis>-<random hex>`; unique across restarts without a counter.
fn new_operation_id() -> String {
    format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

/// Keep only the newest operation per `listId:itemId:type` slot and return the
/// survivors in ascending timestamp order. Equal timestamps resolve to the
/// entry that comes later in `queue`.
pub fn deduplicate_queue(queue: &[PendingOperation]) -> Vec<PendingOperation> {
    let mut latest: HashMap<String, &PendingOperation> = HashMap::new();
    for op in queue {
        let key = op.dedup_key();
        match latest.get(&key) {
            Some(existing) if existing.timestamp > op.timestamp => {}
            _ => {
                latest.insert(key, op);
            }
        }
    }

    // Walk the input again so ties keep their relative order after the stable sort
    let mut survivors: Vec<PendingOperation> = queue
        .iter()
        .filter(|op| {
            latest
                .get(&op.dedup_key())
                .is_some_and(|kept| std::ptr::eq(*kept, *op))
        })
        .cloned()
        .collect();
    survivors.sort_by_key(|op| op.timestamp);
    survivors
}

/// Ids of queued entries that `survivor` supersedes, itself excluded.
pub fn superseded_by(queue: &[PendingOperation], survivor: &PendingOperation) -> Vec<String> {
    let key = survivor.dedup_key();
    queue
        .iter()
        .filter(|op| op.id != survivor.id && op.dedup_key() == key)
        .map(|op| op.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{DateTime, TimeZone};

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn toggle(id: &str, item_id: &str, purchased: bool, t: i64) -> PendingOperation {
        PendingOperation::new(
            id.to_string(),
            "L1",
            item_id,
            Operation::TogglePurchased { purchased },
            at(t),
        )
    }

    #[test]
    fn test_dedup_keeps_latest_per_slot() {
        let queue = vec![
            toggle("a1", "A", true, 1),
            toggle("a2", "A", false, 2),
            toggle("b1", "B", true, 3),
        ];
        let deduped = deduplicate_queue(&queue);
        assert_eq!(deduped, vec![toggle("a2", "A", false, 2), toggle("b1", "B", true, 3)]);
    }

    #[test]
    fn test_dedup_ignores_input_order_for_winner() {
        // An older entry appended later must not win
        let queue = vec![toggle("new", "A", false, 9), toggle("old", "A", true, 4)];
        let deduped = deduplicate_queue(&queue);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "new");
    }

    #[test]
    fn test_dedup_tie_goes_to_later_entry() {
        let queue = vec![toggle("first", "A", true, 7), toggle("second", "A", false, 7)];
        let deduped = deduplicate_queue(&queue);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "second");
    }

    #[test]
    fn test_dedup_sorts_ascending() {
        let queue = vec![toggle("c", "C", true, 30), toggle("a", "A", true, 10), toggle("b", "B", true, 20)];
        let ids: Vec<String> = deduplicate_queue(&queue).into_iter().map(|op| op.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dedup_separates_lists() {
        let mut other_list = toggle("x", "A", false, 2);
        other_list.list_id = "L2".to_string();
        let queue = vec![toggle("a", "A", true, 1), other_list];
        assert_eq!(deduplicate_queue(&queue).len(), 2);
    }

    #[test]
    fn test_superseded_by() {
        let queue = vec![toggle("a1", "A", true, 1), toggle("b1", "B", true, 2), toggle("a2", "A", false, 3)];
        assert_eq!(superseded_by(&queue, &queue[2]), vec!["a1".to_string()]);
        assert!(superseded_by(&queue, &queue[1]).is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_assigns_id_and_timestamp() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let before = Utc::now();
        let first = queue
            .enqueue("L1", "i1", Operation::TogglePurchased { purchased: true })
            .await
            .unwrap();
        let second = queue
            .enqueue("L1", "i1", Operation::TogglePurchased { purchased: false })
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.timestamp >= before - chrono::Duration::milliseconds(1));
        assert_eq!(queue.get_queue().await, vec![first, second]);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let kv = Arc::new(MemoryStore::new());
        let op = PendingQueue::new(kv.clone())
            .enqueue("L1", "i1", Operation::TogglePurchased { purchased: true })
            .await
            .unwrap();

        let reopened = PendingQueue::new(kv);
        assert_eq!(reopened.get_queue().await, vec![op]);
    }

    #[tokio::test]
    async fn test_dequeue_and_clear() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let a = queue.enqueue("L1", "a", Operation::TogglePurchased { purchased: true }).await.unwrap();
        let b = queue.enqueue("L1", "b", Operation::TogglePurchased { purchased: true }).await.unwrap();

        queue.dequeue(&a.id).await.unwrap();
        queue.dequeue("missing").await.unwrap();
        assert_eq!(queue.get_queue().await, vec![b]);

        queue.clear_queue().await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_corrupt_queue_reads_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.insert_raw("sync:queue", "[{\"id\":").await;
        let queue = PendingQueue::new(kv);
        assert!(queue.get_queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_does_not_overwrite_queue() {
        let kv = Arc::new(MemoryStore::new());
        let queue = PendingQueue::new(kv.clone());
        let mut queued = Vec::new();
        for item in ["a", "b", "c"] {
            queued.push(
                queue
                    .enqueue("L1", item, Operation::TogglePurchased { purchased: true })
                    .await
                    .unwrap(),
            );
        }

        kv.set_fail_reads(true);
        let result = queue
            .enqueue("L1", "d", Operation::TogglePurchased { purchased: true })
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(queue.dequeue(&queued[0].id).await.is_err());

        kv.set_fail_reads(false);
        assert_eq!(queue.get_queue().await, queued);
        queue
            .enqueue("L1", "d", Operation::TogglePurchased { purchased: true })
            .await
            .unwrap();
        assert_eq!(queue.len().await, 4);
    }

    #[tokio::test]
    async fn test_enqueue_replaces_corrupt_queue() {
        let kv = Arc::new(MemoryStore::new());
        kv.insert_raw("sync:queue", "not json").await;
        let queue = PendingQueue::new(kv);

        let op = queue
            .enqueue("L1", "i1", Operation::TogglePurchased { purchased: true })
            .await
            .unwrap();
        assert_eq!(queue.get_queue().await, vec![op]);
    }

    #[tokio::test]
    async fn test_enqueue_reports_storage_failure() {
        let kv = Arc::new(MemoryStore::new());
        kv.set_fail_writes(true);
        let queue = PendingQueue::new(kv);
        let result = queue
            .enqueue("L1", "i1", Operation::TogglePurchased { purchased: true })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_are_not_lost() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let mut handles = Vec::new();
        for n in 0..10 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue("L1", &format!("i{}", n), Operation::TogglePurchased { purchased: true })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(queue.len().await, 10);
    }
}
