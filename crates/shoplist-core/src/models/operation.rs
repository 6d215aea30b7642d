//! Pending write operations.
//!
//! A `PendingOperation` is a write that has been applied locally but not yet
//! confirmed by the remote store. Persisted as JSON:
//!
//! ```json
//! {"id":"1718000000000-1a2b3c4d","type":"togglePurchased","payload":{"purchased":true},
//!  "listId":"L1","itemId":"i1","timestamp":1718000000000}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::list::{ItemPatch, ShoppingListItem};

/// The field delta carried by a pending write.
///
/// New kinds (quantity update, delete, add) are added as variants; each one
/// must define its dedup type name, its remote patch, and how it projects
/// onto a cached item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Operation {
    TogglePurchased { purchased: bool },
}

impl Operation {
    /// Type component of the dedup key. Matches the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::TogglePurchased { .. } => "togglePurchased",
        }
    }

    /// Remote update body for this operation.
    pub fn patch(&self) -> ItemPatch {
        match self {
            Operation::TogglePurchased { purchased } => ItemPatch::purchased(*purchased),
        }
    }

    /// Apply the delta to an item. Returns true if the item changed.
    pub fn apply_to(&self, item: &mut ShoppingListItem) -> bool {
        match self {
            Operation::TogglePurchased { purchased } => {
                let changed = item.purchased != *purchased;
                item.purchased = *purchased;
                changed
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(rename = "listId")]
    pub list_id: String,
    #[serde(rename = "itemId")]
    pub item_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(
        id: String,
        list_id: impl Into<String>,
        item_id: impl Into<String>,
        operation: Operation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation,
            list_id: list_id.into(),
            item_id: item_id.into(),
            timestamp,
        }
    }

    /// `listId:itemId:type` - only the newest operation per key is sent.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.list_id, self.item_id, self.operation.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn toggle(purchased: bool) -> PendingOperation {
        PendingOperation::new(
            "op-1".to_string(),
            "L1",
            "i1",
            Operation::TogglePurchased { purchased },
            Utc.timestamp_millis_opt(1_718_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_serialized_layout() {
        let value = serde_json::to_value(toggle(true)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "op-1",
                "type": "togglePurchased",
                "payload": {"purchased": true},
                "listId": "L1",
                "itemId": "i1",
                "timestamp": 1_718_000_000_000i64,
            })
        );
    }

    #[test]
    fn test_parse_persisted_operation() {
        let json = r#"{"id":"x","type":"togglePurchased","listId":"L2","itemId":"i7","payload":{"purchased":false},"timestamp":5}"#;
        let op: PendingOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.operation, Operation::TogglePurchased { purchased: false });
        assert_eq!(op.timestamp.timestamp_millis(), 5);
        assert_eq!(op.dedup_key(), "L2:i7:togglePurchased");
    }

    #[test]
    fn test_unknown_operation_type_is_rejected() {
        let json = r#"{"id":"x","type":"renameList","listId":"L2","itemId":"i7","payload":{},"timestamp":5}"#;
        assert!(serde_json::from_str::<PendingOperation>(json).is_err());
    }

    #[test]
    fn test_patch_matches_payload() {
        let op = Operation::TogglePurchased { purchased: true };
        assert_eq!(op.patch(), ItemPatch::purchased(true));
    }
}
