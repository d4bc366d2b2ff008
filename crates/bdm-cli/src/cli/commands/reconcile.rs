//! `bdm reconcile` – drop completed entries whose folders no longer validate.

use anyhow::{Context, Result};
use bdm_core::config::BdmConfig;
use bdm_core::ledger::LedgerStore;
use bdm_core::validator::{AssetValidator, ValidationPolicy};

pub async fn run_reconcile(cfg: &BdmConfig) -> Result<()> {
    let path = cfg.ledger_path()?;
    let mut store =
        LedgerStore::open(&path).with_context(|| format!("open ledger: {}", path.display()))?;
    let validator = AssetValidator::new(ValidationPolicy::from(&cfg.validation));
    let report = store.ledger_mut().reconcile(&validator);
    store.commit().await.context("save ledger")?;

    println!(
        "checked {} completed item(s): {} removed, {} unverifiable",
        report.checked,
        report.removed.len(),
        report.unverifiable
    );
    for id in &report.removed {
        println!("  removed {}", id);
    }
    Ok(())
}
