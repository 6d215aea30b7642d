//! Optimistic projection of pending writes onto cached list detail.

use tracing::debug;

use crate::cache::CacheManager;
use crate::models::{PendingOperation, ShoppingList};

/// Apply `op` to `list` in place. Returns false when the operation does not
/// target this list or the item is not present; items are never synthesized.
pub fn project(op: &PendingOperation, list: &mut ShoppingList) -> bool {
    if op.list_id != list.id {
        return false;
    }
    match list.item_mut(&op.item_id) {
        Some(item) => {
            op.operation.apply_to(item);
            true
        }
        None => false,
    }
}

/// Patch the cached detail for `op.list_id` and re-persist it with a fresh
/// capture time. A cold cache or a missing item is a no-op.
pub async fn apply_operation_to_cache(cache: &CacheManager, op: &PendingOperation) {
    let Some(cached) = cache.get_cached_list_detail(&op.list_id).await else {
        debug!(list_id = %op.list_id, "No cached detail to patch");
        return;
    };

    let mut list = cached.data;
    if !project(op, &mut list) {
        debug!(list_id = %op.list_id, item_id = %op.item_id, "Item not in cached detail, skipping");
        return;
    }
    cache.cache_list_detail(&list).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Operation, ShoppingListItem};
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn list() -> ShoppingList {
        ShoppingList {
            id: "L1".to_string(),
            name: "Weekly".to_string(),
            items: vec![ShoppingListItem {
                id: "i1".to_string(),
                name: "Milk".to_string(),
                quantity: "1".to_string(),
                price: None,
                purchased: false,
                category: None,
                notes: String::new(),
                photo_uri: None,
                recipe_id: None,
            }],
            is_active: true,
        }
    }

    fn toggle(list_id: &str, item_id: &str, purchased: bool) -> PendingOperation {
        PendingOperation::new(
            "op".to_string(),
            list_id,
            item_id,
            Operation::TogglePurchased { purchased },
            Utc::now(),
        )
    }

    #[test]
    fn test_project_is_idempotent() {
        let op = toggle("L1", "i1", true);
        let mut once = list();
        project(&op, &mut once);
        let mut twice = list();
        project(&op, &mut twice);
        project(&op, &mut twice);
        assert_eq!(once, twice);
        assert!(once.items[0].purchased);
    }

    #[test]
    fn test_project_skips_other_list_and_missing_item() {
        let mut l = list();
        assert!(!project(&toggle("L2", "i1", true), &mut l));
        assert!(!project(&toggle("L1", "nope", true), &mut l));
        assert_eq!(l, list());
    }

    #[tokio::test]
    async fn test_apply_patches_cache() {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        cache.cache_list_detail(&list()).await;
        let before = cache.get_cached_list_detail("L1").await.unwrap().cached_at;

        apply_operation_to_cache(&cache, &toggle("L1", "i1", true)).await;

        let cached = cache.get_cached_list_detail("L1").await.unwrap();
        assert!(cached.data.items[0].purchased);
        assert!(cached.cached_at >= before);
    }

    #[tokio::test]
    async fn test_apply_twice_matches_once() {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        cache.cache_list_detail(&list()).await;
        let op = toggle("L1", "i1", true);

        apply_operation_to_cache(&cache, &op).await;
        let once = cache.get_cached_list_detail("L1").await.unwrap().data;
        apply_operation_to_cache(&cache, &op).await;
        let twice = cache.get_cached_list_detail("L1").await.unwrap().data;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_apply_on_cold_cache_is_noop() {
        let kv = Arc::new(MemoryStore::new());
        let cache = CacheManager::new(kv.clone());
        apply_operation_to_cache(&cache, &toggle("L1", "i1", true)).await;
        assert!(crate::storage::KeyValueStore::keys(kv.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_does_not_synthesize_items() {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        cache.cache_list_detail(&list()).await;
        apply_operation_to_cache(&cache, &toggle("L1", "i9", true)).await;
        assert_eq!(cache.get_cached_list_detail("L1").await.unwrap().data, list());
    }
}
