//! Data models for shopping lists and pending writes.
//!
//! - `ShoppingList`, `ShoppingListItem`: list detail as served by the remote store
//! - `ListSummary`: overview entry shown on the lists screen
//! - `ItemPatch`: partial-field delta sent to the remote on update
//! - `Operation`, `PendingOperation`: queued writes awaiting confirmation

pub mod list;
pub mod operation;

pub use list::{ItemPatch, ListSummary, ShoppingList, ShoppingListItem};
pub use operation::{Operation, PendingOperation};
