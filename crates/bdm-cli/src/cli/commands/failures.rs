//! `bdm failures` – print the permanent failure log.

use anyhow::Result;
use bdm_core::config::BdmConfig;
use bdm_core::ledger::{self, FailedItem};

fn tail(log: &[FailedItem], limit: Option<usize>) -> &[FailedItem] {
    match limit {
        Some(n) if n < log.len() => &log[log.len() - n..],
        _ => log,
    }
}

pub fn run_failures(cfg: &BdmConfig, limit: Option<usize>, json: bool) -> Result<()> {
    let l = ledger::load(&cfg.ledger_path()?)?;
    let entries = tail(&l.failure_log, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No permanently failed items.");
        return Ok(());
    }
    println!("{:<24} {:<6} {:<8} {:<20} {}", "ITEM", "PAGE", "ATTEMPTS", "MISSING", "QUARANTINED TO");
    for f in entries {
        let missing: Vec<&str> = f.missing.iter().map(|k| k.as_str()).collect();
        let place = match (&f.quarantined_to, &f.quarantine_error) {
            (Some(p), _) => p.display().to_string(),
            (None, Some(e)) => format!("(move failed: {})", e),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:<24} {:<6} {:<8} {:<20} {}",
            f.item_id,
            f.page,
            f.attempts,
            missing.join(","),
            place
        );
    }
    Ok(())
}
