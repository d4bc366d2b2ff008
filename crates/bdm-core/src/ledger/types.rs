//! Persisted ledger schema.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::item::{AssetKind, RequiredAsset};

/// Current on-disk schema version.
pub const LEDGER_VERSION: u32 = 1;

/// A verified-complete item. Keeps enough to re-validate without rediscovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedItem {
    pub page: u32,
    pub folder: PathBuf,
    pub assets: Vec<RequiredAsset>,
    pub completed_at: i64,
}

/// An item in the retry pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub item_id: String,
    pub page: u32,
    /// Failed validation cycles so far (1-based once a record exists).
    pub attempts: u32,
    pub last_attempt_at: i64,
    pub folder: PathBuf,
    /// Asset kinds missing at the last check.
    #[serde(default)]
    pub missing: Vec<AssetKind>,
}

/// Historical entry for an item that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item_id: String,
    pub page: u32,
    pub attempts: u32,
    pub missing: Vec<AssetKind>,
    /// Where the folder went. `None` if there was nothing to move or the move failed.
    pub quarantined_to: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_error: Option<String>,
    pub failed_at: i64,
}

/// The durable progress record.
///
/// Invariant: an id is never a key of both `completed` and `attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub version: u32,
    /// Next page to process. `None` until the first batch settles.
    pub cursor_page: Option<u32>,
    pub completed: BTreeMap<String, CompletedItem>,
    pub attempts: BTreeMap<String, AttemptRecord>,
    pub permanently_failed_pages: BTreeSet<u32>,
    /// Pages whose discovery failed; revisited at the start of the next run.
    pub deferred_pages: BTreeSet<u32>,
    pub failure_log: Vec<FailedItem>,
    pub last_updated: i64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            cursor_page: None,
            completed: BTreeMap::new(),
            attempts: BTreeMap::new(),
            permanently_failed_pages: BTreeSet::new(),
            deferred_pages: BTreeSet::new(),
            failure_log: Vec::new(),
            last_updated: 0,
        }
    }
}
