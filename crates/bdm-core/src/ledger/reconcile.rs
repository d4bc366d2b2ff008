use crate::validator::AssetValidator;

use super::types::Ledger;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Ids dropped because their folder no longer validates.
    pub removed: Vec<String>,
    /// Entries kept because validation hit an I/O error.
    pub unverifiable: usize,
}

impl Ledger {
    /// Re-validate every completed entry against disk and drop the ones that fail.
    ///
    /// Only ever removes claims; an entry whose folder cannot be read stays put.
    pub fn reconcile(&mut self, validator: &AssetValidator) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for (id, entry) in &self.completed {
            report.checked += 1;
            match validator.validate(&entry.folder, &entry.assets) {
                Ok(v) if v.complete => {}
                Ok(v) => {
                    tracing::debug!(item = %id, missing = ?v.missing, "completed item no longer validates");
                    report.removed.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!(item = %id, "cannot re-validate completed item: {}", e);
                    report.unverifiable += 1;
                }
            }
        }
        for id in &report.removed {
            self.completed.remove(id);
        }
        tracing::info!(
            checked = report.checked,
            corrected = report.removed.len(),
            unverifiable = report.unverifiable,
            "ledger reconciled"
        );
        report
    }
}
