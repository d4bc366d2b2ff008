//! Duplicate handling for discovered items.
//!
//! With `skip_completed`, an item whose id is already in the ledger's completed set is
//! dropped before enqueue, so rediscovering an old page costs nothing but a lookup.

use serde::{Deserialize, Serialize};

use crate::item::ItemDescriptor;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Skip items already recorded as completed.
    #[default]
    SkipCompleted,
    /// Re-process every discovered item. An id listed on two pages of one batch
    /// still runs only once.
    Off,
}

/// Split `items` into (to process, skipped ids).
pub fn filter_items(
    policy: DuplicatePolicy,
    ledger: &Ledger,
    items: Vec<ItemDescriptor>,
) -> (Vec<ItemDescriptor>, Vec<String>) {
    if policy == DuplicatePolicy::Off {
        return (items, Vec::new());
    }
    let mut keep = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    for item in items {
        if ledger.is_completed(&item.id) {
            skipped.push(item.id);
        } else {
            keep.push(item);
        }
    }
    (keep, skipped)
}
