//! Progress ledger: completed items, the retry pool, permanently failed pages and
//! the resume cursor, persisted as one JSON document.
//!
//! All mutation happens in memory on a [`Ledger`]; [`LedgerStore::commit`] is the
//! only path to disk and always replaces the file atomically.

mod persist;
mod reconcile;
mod types;

#[cfg(test)]
mod tests;

pub use persist::{default_path, load, save};
pub use reconcile::ReconcileReport;
pub use types::{AttemptRecord, CompletedItem, FailedItem, Ledger, LEDGER_VERSION};

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LedgerIoError;
use crate::item::{AssetKind, RequiredAsset};

pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Ledger {
    pub fn is_completed(&self, item_id: &str) -> bool {
        self.completed.contains_key(item_id)
    }

    pub fn is_permanently_failed(&self, page: u32) -> bool {
        self.permanently_failed_pages.contains(&page)
    }

    /// Failed cycles recorded so far for `item_id` (0 if not in the retry pool).
    pub fn attempts_for(&self, item_id: &str) -> u32 {
        self.attempts.get(item_id).map(|r| r.attempts).unwrap_or(0)
    }

    /// Add to the completed set and drop any attempt record for the id.
    pub fn mark_completed(
        &mut self,
        item_id: &str,
        page: u32,
        folder: &Path,
        assets: Vec<RequiredAsset>,
    ) {
        self.attempts.remove(item_id);
        self.completed.insert(
            item_id.to_string(),
            CompletedItem {
                page,
                folder: folder.to_path_buf(),
                assets,
                completed_at: unix_timestamp(),
            },
        );
    }

    /// Create or bump the attempt record for a failed validation cycle and return the
    /// new count. The count is clamped at `max_attempts` so a lowered ceiling takes
    /// effect on the next failure instead of overshooting.
    pub fn record_failure(
        &mut self,
        item_id: &str,
        page: u32,
        folder: &Path,
        missing: &[AssetKind],
        max_attempts: u32,
    ) -> u32 {
        self.completed.remove(item_id);
        let now = unix_timestamp();
        let ceiling = max_attempts.max(1);
        let record = self
            .attempts
            .entry(item_id.to_string())
            .or_insert_with(|| AttemptRecord {
                item_id: item_id.to_string(),
                page,
                attempts: 0,
                last_attempt_at: now,
                folder: folder.to_path_buf(),
                missing: Vec::new(),
            });
        record.attempts = (record.attempts + 1).min(ceiling);
        record.page = page;
        record.folder = folder.to_path_buf();
        record.last_attempt_at = now;
        record.missing = missing.to_vec();
        record.attempts
    }

    /// Move an exhausted item from the retry pool into the failure log.
    /// Returns the log entry, or `None` if the id had no attempt record.
    pub fn record_permanent_failure(
        &mut self,
        item_id: &str,
        quarantined_to: Option<PathBuf>,
        quarantine_error: Option<String>,
    ) -> Option<&FailedItem> {
        let record = self.attempts.remove(item_id)?;
        self.failure_log.push(FailedItem {
            item_id: record.item_id,
            page: record.page,
            attempts: record.attempts,
            missing: record.missing,
            quarantined_to,
            quarantine_error,
            failed_at: unix_timestamp(),
        });
        self.failure_log.last()
    }

    /// Drop every attempt record for `page` and mark the page permanently failed.
    /// Returns how many records were dropped.
    pub fn escalate_to_permanent(&mut self, page: u32) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, r| r.page != page);
        self.permanently_failed_pages.insert(page);
        self.deferred_pages.remove(&page);
        before - self.attempts.len()
    }

    pub fn update_cursor(&mut self, page: u32) {
        self.cursor_page = Some(page);
    }

    pub fn defer_page(&mut self, page: u32) {
        if !self.is_permanently_failed(page) {
            self.deferred_pages.insert(page);
        }
    }

    pub fn clear_deferred(&mut self, page: u32) -> bool {
        self.deferred_pages.remove(&page)
    }
}

/// Owns the in-memory ledger and the path it is committed to.
///
/// A store without a path (dry runs, tests) accepts commits and never touches disk.
#[derive(Debug)]
pub struct LedgerStore {
    path: Option<PathBuf>,
    ledger: Ledger,
}

impl LedgerStore {
    /// Load from `path` (defaults if absent or corrupt).
    pub fn open(path: &Path) -> Result<Self, LedgerIoError> {
        let ledger = load(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            ledger,
        })
    }

    pub fn in_memory(ledger: Ledger) -> Self {
        Self { path: None, ledger }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Stamp `last_updated` and write the ledger out.
    ///
    /// The document is serialized in place; the file write and fsync run on the
    /// blocking pool. Callers hold the store lock across the await, so commits
    /// land in order.
    pub async fn commit(&mut self) -> Result<(), LedgerIoError> {
        self.ledger.last_updated = unix_timestamp();
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.ledger).map_err(LedgerIoError::Serialize)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || persist::write_atomic(&json, &target))
            .await
            .map_err(|e| LedgerIoError::Write {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }
}
