//! Display Items
//!
//! The normalized, UI-ready projection of a ledger event and the
//! identity-keyed store that deduplicates them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Display Item
// =============================================================================

/// Normalized projection of one ledger event.
///
/// `id` is the dedup key. Re-upserting the same id replaces every other
/// field wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayItem {
    /// Globally unique event id.
    pub id: String,
    /// Human-readable category label, may embed an asset code.
    pub name: String,
    /// Human-readable amount or status.
    pub value: String,
    /// Sending account (payments only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Asset code of the payment (payments only, absent for native).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_code: Option<String>,
    /// Self-reference URL of the source record.
    pub link: String,
    /// Creation timestamp of the source record.
    pub date: String,
}

// =============================================================================
// Item Store
// =============================================================================

/// Identity-keyed collection of display items with upsert semantics.
///
/// The store never evicts; it grows for the lifetime of its subscription.
#[derive(Debug, Default, Clone)]
pub struct ItemStore {
    items: HashMap<String, DisplayItem>,
}

impl ItemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item or replace the entry with the same id.
    ///
    /// Returns `true` if the id was not present before.
    pub fn upsert(&mut self, item: DisplayItem) -> bool {
        self.items.insert(item.id.clone(), item).is_none()
    }

    /// Snapshot of every current item, in no particular order.
    #[must_use]
    pub fn values(&self) -> Vec<DisplayItem> {
        self.items.values().cloned().collect()
    }

    /// Look up an item by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DisplayItem> {
        self.items.get(id)
    }

    /// Number of distinct items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
