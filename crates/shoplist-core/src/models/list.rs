//! Domain models for shopping lists.
//!
//! Field names follow the remote API's camelCase JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ShoppingListItem>,
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
}

impl ShoppingList {
    pub fn item(&self, item_id: &str) -> Option<&ShoppingListItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut ShoppingListItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    pub fn purchased_count(&self) -> usize {
        self.items.iter().filter(|i| i.purchased).count()
    }

    /// Sum of known prices, ignoring items without one.
    pub fn estimated_total(&self) -> f64 {
        self.items.iter().filter_map(|i| i.price).sum()
    }

    pub fn summary(&self) -> ListSummary {
        ListSummary::from(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ShoppingListItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub purchased: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(rename = "photoUri", default)]
    pub photo_uri: Option<String>,
    #[serde(rename = "recipeId", default)]
    pub recipe_id: Option<String>,
}

impl ShoppingListItem {
    /// Apply every field present in the patch.
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(purchased) = patch.purchased {
            self.purchased = purchased;
        }
        if let Some(ref quantity) = patch.quantity {
            self.quantity = quantity.clone();
        }
        if let Some(price) = patch.price {
            self.price = Some(price);
        }
        if let Some(ref notes) = patch.notes {
            self.notes = notes.clone();
        }
        if let Some(ref photo_uri) = patch.photo_uri {
            self.photo_uri = Some(photo_uri.clone());
        }
    }

    pub fn display_quantity(&self) -> String {
        if self.quantity.is_empty() {
            "1".to_string()
        } else {
            self.quantity.clone()
        }
    }
}

/// Overview entry for the lists screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ListSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
    #[serde(rename = "itemCount", default)]
    pub item_count: usize,
    #[serde(rename = "purchasedCount", default)]
    pub purchased_count: usize,
}

impl ListSummary {
    pub fn progress_display(&self) -> String {
        format!("{}/{}", self.purchased_count, self.item_count)
    }
}

impl From<&ShoppingList> for ListSummary {
    fn from(list: &ShoppingList) -> Self {
        Self {
            id: list.id.clone(),
            name: list.name.clone(),
            is_active: list.is_active,
            item_count: list.items.len(),
            purchased_count: list.purchased_count(),
        }
    }
}

/// Partial update of the mutable item fields. Absent fields are left untouched
/// by the remote and omitted from the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "photoUri", skip_serializing_if = "Option::is_none")]
    pub photo_uri: Option<String>,
}

impl ItemPatch {
    pub fn purchased(purchased: bool) -> Self {
        Self {
            purchased: Some(purchased),
            ..Default::default()
        }
    }
}
