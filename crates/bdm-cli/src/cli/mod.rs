//! CLI for the BDM batch download manager.

mod commands;
mod control_socket;

use anyhow::Result;
use bdm_core::{config, logging};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_batches, run_failures, run_reconcile, run_status, run_stop, RunArgs};

/// Top-level CLI for the BDM batch download manager.
#[derive(Debug, Parser)]
#[command(name = "bdm")]
#[command(
    about = "BDM: paginated batch downloads with verified, resumable progress",
    long_about = None
)]
pub struct Cli {
    /// More log detail (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Walk pages downward from the cursor, downloading and verifying each batch.
    Run {
        /// First page to process (default: saved cursor, then the highest manifest).
        #[arg(long, value_name = "PAGE")]
        start_page: Option<u32>,
        /// Stop after this many pages.
        #[arg(long, value_name = "N")]
        max_pages: Option<usize>,
        /// Pages per batch (default from config).
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Validation cycles per item before quarantine (default from config).
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,
        /// Stop admitting pages at this much data under the download root (e.g. 500G).
        #[arg(long, value_name = "SIZE", value_parser = parse_size)]
        storage_cap: Option<u64>,
        /// Discover and validate only: no agent calls, no quarantine, ledger untouched.
        #[arg(long)]
        dry_run: bool,
        /// Directory of page_<n>.json manifests (default: manifest_dir from config).
        #[arg(long, value_name = "DIR")]
        manifests: Option<PathBuf>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show ledger state and storage usage.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Re-check completed items against disk and drop the ones that no longer validate.
    Reconcile,

    /// List permanently failed items.
    Failures {
        /// Only the most recent N entries.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// Ask an active `bdm run` to stop after the current round.
    Stop,
}

/// Parse a byte count with an optional binary suffix (K, M, G, T; `B`/`iB` allowed).
pub fn parse_size(s: &str) -> Result<u64, String> {
    let t = s.trim();
    let upper = t.to_ascii_uppercase();
    let body = upper
        .strip_suffix("IB")
        .or_else(|| upper.strip_suffix('B'))
        .unwrap_or(&upper);
    let (digits, shift) = match body.chars().last() {
        Some('K') => (&body[..body.len() - 1], 10),
        Some('M') => (&body[..body.len() - 1], 20),
        Some('G') => (&body[..body.len() - 1], 30),
        Some('T') => (&body[..body.len() - 1], 40),
        _ => (body, 0),
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {:?}", s))?;
    n.checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size too large: {:?}", s))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        logging::init_logging(cli.verbose);
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                start_page,
                max_pages,
                batch_size,
                max_attempts,
                storage_cap,
                dry_run,
                manifests,
                json,
            } => {
                let args = RunArgs {
                    start_page,
                    max_pages,
                    batch_size,
                    max_attempts,
                    storage_cap,
                    dry_run,
                    manifests,
                    json,
                };
                run_batches(&cfg, args).await?
            }
            CliCommand::Status { json } => run_status(&cfg, json)?,
            CliCommand::Reconcile => run_reconcile(&cfg).await?,
            CliCommand::Failures { limit, json } => run_failures(&cfg, limit, json)?,
            CliCommand::Stop => run_stop().await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
