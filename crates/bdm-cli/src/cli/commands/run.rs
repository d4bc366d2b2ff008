//! `bdm run` – process pages in batches until a stop condition.

use anyhow::{bail, Context, Result};
use bdm_core::collab::{CommandAgent, DownloadAgent, ManifestSource, PageSource, UnconfiguredAgent};
use bdm_core::config::BdmConfig;
use bdm_core::control::{default_control_socket_path, RunControl};
use bdm_core::ledger::LedgerStore;
use bdm_core::orchestrator::{BatchOrchestrator, RunOptions};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::control_socket;

/// Flags of `bdm run`; `None` falls back to config.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub start_page: Option<u32>,
    pub max_pages: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub storage_cap: Option<u64>,
    pub dry_run: bool,
    pub manifests: Option<PathBuf>,
    pub json: bool,
}

impl RunArgs {
    pub fn options(&self, cfg: &BdmConfig) -> RunOptions {
        let base = RunOptions::from_config(cfg);
        RunOptions {
            start_page: self.start_page,
            max_pages: self.max_pages,
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            storage_cap_bytes: self.storage_cap.or(base.storage_cap_bytes),
            dry_run: self.dry_run,
        }
    }
}

pub async fn run_batches(cfg: &BdmConfig, args: RunArgs) -> Result<()> {
    let manifest_dir = args
        .manifests
        .clone()
        .or_else(|| cfg.manifest_dir.clone())
        .context("no manifest directory: pass --manifests or set manifest_dir in config.toml")?;
    let source: Arc<dyn PageSource> =
        Arc::new(ManifestSource::new(manifest_dir, &cfg.download_root));

    let agent: Arc<dyn DownloadAgent> = match CommandAgent::from_config(&cfg.agent) {
        Ok(agent) => Arc::new(agent),
        Err(_) if args.dry_run => Arc::new(UnconfiguredAgent),
        Err(_) => bail!("no download agent configured: set [agent] program in config.toml"),
    };

    let ledger_path = cfg.ledger_path()?;
    let store = LedgerStore::open(&ledger_path)
        .with_context(|| format!("open ledger: {}", ledger_path.display()))?;

    let control = RunControl::new();
    let orchestrator = BatchOrchestrator::from_config(cfg, source, agent, store)
        .with_control(control.clone());

    let socket_path = default_control_socket_path().ok();
    let listener = socket_path
        .as_ref()
        .and_then(|p| control_socket::spawn_control_listener(control.clone(), p).ok());
    let ctrl_c = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("stopping after the current round...");
                control.request_stop("ctrl-c");
            }
        })
    };

    let opts = args.options(cfg);
    tracing::info!(ledger = %ledger_path.display(), ?opts, "bdm run");
    let result = orchestrator.run(&opts).await;

    ctrl_c.abort();
    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }

    let summary = result?;
    if let Some(reason) = orchestrator.control().stop_reason() {
        tracing::info!("stop requested by {}", reason);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}
