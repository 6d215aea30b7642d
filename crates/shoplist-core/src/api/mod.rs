//! Remote list API.
//!
//! This module provides the `RemoteListApi` trait the store and sync engine
//! talk to, the reqwest-backed `ApiClient`, and `ApiError` with its
//! network / not-found / other classification.

pub mod client;
pub mod error;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ItemPatch, ListSummary, ShoppingList, ShoppingListItem};

pub use client::ApiClient;
pub use error::{classify, ApiError, ErrorClass};

/// Authoritative CRUD endpoint for lists and items.
#[async_trait]
pub trait RemoteListApi: Send + Sync {
    async fn fetch_lists(&self) -> Result<Vec<ListSummary>>;

    async fn fetch_list_detail(&self, list_id: &str) -> Result<ShoppingList>;

    async fn update_item(
        &self,
        list_id: &str,
        item_id: &str,
        patch: &ItemPatch,
    ) -> Result<ShoppingListItem>;
}
