//! In-memory remote used by the engine and store tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use crate::api::{ApiError, RemoteListApi};
use crate::models::{ItemPatch, ListSummary, ShoppingList, ShoppingListItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchLists,
    FetchListDetail(String),
    UpdateItem {
        list_id: String,
        item_id: String,
        patch: ItemPatch,
    },
}

#[derive(Default)]
pub struct FakeRemote {
    lists: Mutex<HashMap<String, ShoppingList>>,
    calls: Mutex<Vec<Call>>,
    update_failures: Mutex<VecDeque<ApiError>>,
    update_holds: Mutex<VecDeque<oneshot::Receiver<()>>>,
    unreachable: AtomicBool,
}

pub fn item(id: &str, name: &str, purchased: bool) -> ShoppingListItem {
    ShoppingListItem {
        id: id.to_string(),
        name: name.to_string(),
        quantity: "1".to_string(),
        price: None,
        purchased,
        category: None,
        notes: String::new(),
        photo_uri: None,
        recipe_id: None,
    }
}

/// `L1 = { items: [{ id: "i1", name: "Milk", purchased: false }] }`
pub fn milk_list() -> ShoppingList {
    ShoppingList {
        id: "L1".to_string(),
        name: "Groceries".to_string(),
        items: vec![item("i1", "Milk", false)],
        is_active: true,
    }
}

pub fn hardware_list() -> ShoppingList {
    ShoppingList {
        id: "L2".to_string(),
        name: "Hardware".to_string(),
        items: vec![item("j1", "Screws", false)],
        is_active: false,
    }
}

impl FakeRemote {
    pub fn new(lists: Vec<ShoppingList>) -> Self {
        Self {
            lists: Mutex::new(lists.into_iter().map(|l| (l.id.clone(), l)).collect()),
            ..Default::default()
        }
    }

    pub fn with_milk_list() -> Self {
        Self::new(vec![milk_list()])
    }

    pub fn with_two_lists() -> Self {
        Self::new(vec![milk_list(), hardware_list()])
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn update_calls(&self) -> Vec<(String, String, ItemPatch)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                Call::UpdateItem {
                    list_id,
                    item_id,
                    patch,
                } => Some((list_id.clone(), item_id.clone(), patch.clone())),
                _ => None,
            })
            .collect()
    }

    pub async fn list(&self, list_id: &str) -> Option<ShoppingList> {
        self.lists.lock().await.get(list_id).cloned()
    }

    /// Edit the authoritative copy directly, as another device would.
    pub async fn edit_list(&self, list: ShoppingList) {
        self.lists.lock().await.insert(list.id.clone(), list);
    }

    pub async fn fail_next_update(&self, error: ApiError) {
        self.update_failures.lock().await.push_back(error);
    }

    /// Make the next `update_item` wait until the returned sender fires.
    pub async fn hold_next_update(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.update_holds.lock().await.push_back(rx);
        tx
    }

    /// Fail every call with a network error until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ApiError::Unreachable("connection refused".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteListApi for FakeRemote {
    async fn fetch_lists(&self) -> Result<Vec<ListSummary>> {
        self.calls.lock().await.push(Call::FetchLists);
        self.check_reachable()?;
        let mut lists: Vec<ListSummary> =
            self.lists.lock().await.values().map(ListSummary::from).collect();
        lists.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(lists)
    }

    async fn fetch_list_detail(&self, list_id: &str) -> Result<ShoppingList> {
        self.calls
            .lock()
            .await
            .push(Call::FetchListDetail(list_id.to_string()));
        self.check_reachable()?;
        self.lists
            .lock()
            .await
            .get(list_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("list {}", list_id)).into())
    }

    async fn update_item(
        &self,
        list_id: &str,
        item_id: &str,
        patch: &ItemPatch,
    ) -> Result<ShoppingListItem> {
        self.calls.lock().await.push(Call::UpdateItem {
            list_id: list_id.to_string(),
            item_id: item_id.to_string(),
            patch: patch.clone(),
        });

        let hold = self.update_holds.lock().await.pop_front();
        if let Some(hold) = hold {
            let _ = hold.await;
        }

        self.check_reachable()?;
        if let Some(error) = self.update_failures.lock().await.pop_front() {
            return Err(error.into());
        }

        let mut lists = self.lists.lock().await;
        let item = lists
            .get_mut(list_id)
            .and_then(|list| list.item_mut(item_id))
            .ok_or_else(|| ApiError::NotFound(format!("item {}", item_id)))?;
        item.apply_patch(patch);
        Ok(item.clone())
    }
}
