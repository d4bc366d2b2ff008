//! `bdm status` – ledger summary and storage usage.

use anyhow::Result;
use bdm_core::config::BdmConfig;
use bdm_core::ledger;
use bdm_core::storage::{available_space, StorageGuard};
use std::time::Duration;

pub fn run_status(cfg: &BdmConfig, json: bool) -> Result<()> {
    let path = cfg.ledger_path()?;
    let l = ledger::load(&path)?;
    let used = StorageGuard::new(&cfg.download_root, Duration::ZERO)
        .excluding(cfg.quarantine_dir())
        .usage();
    let free = available_space(&cfg.download_root).ok().flatten();

    if json {
        let v = serde_json::json!({
            "ledger": path,
            "cursor_page": l.cursor_page,
            "completed": l.completed.len(),
            "retrying": l.attempts.len(),
            "permanently_failed_pages": l.permanently_failed_pages,
            "deferred_pages": l.deferred_pages,
            "failed_items": l.failure_log.len(),
            "last_updated": l.last_updated,
            "storage_used_bytes": used,
            "storage_cap_bytes": cfg.storage_cap_bytes,
            "free_bytes": free,
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
        return Ok(());
    }

    println!("ledger:          {}", path.display());
    match l.cursor_page {
        Some(c) => println!("next page:       {}", c),
        None => println!("next page:       - (no run yet)"),
    }
    println!("completed items: {}", l.completed.len());
    println!("retrying items:  {}", l.attempts.len());
    println!("failed items:    {}", l.failure_log.len());
    if !l.permanently_failed_pages.is_empty() {
        println!("failed pages:    {:?}", l.permanently_failed_pages);
    }
    if !l.deferred_pages.is_empty() {
        println!("deferred pages:  {:?}", l.deferred_pages);
    }
    match cfg.storage_cap_bytes {
        Some(cap) => println!("storage:         {} / {} bytes", used, cap),
        None => println!("storage:         {} bytes (no cap)", used),
    }
    if let Some(free) = free {
        println!("free on volume:  {} bytes", free);
    }
    if !l.attempts.is_empty() {
        println!();
        println!("{:<24} {:<6} {:<8} {}", "ITEM", "PAGE", "ATTEMPTS", "MISSING");
        for r in l.attempts.values() {
            let missing: Vec<&str> = r.missing.iter().map(|k| k.as_str()).collect();
            println!(
                "{:<24} {:<6} {:<8} {}",
                r.item_id,
                r.page,
                r.attempts,
                missing.join(",")
            );
        }
    }
    Ok(())
}
